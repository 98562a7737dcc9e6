//! Build the configured cache backend.

use crate::backend::CacheBackend;
use crate::config::{CacheBackendKind, CacheConfig};
use crate::elasticache::{ElastiCacheBackend, ElastiCacheSettings};
use crate::local_dev::LocalDevCacheBackend;
use crate::local_dev_redis::LocalDevRedisBackend;
use crate::memory::MemoryCacheBackend;
use crate::multi_tier::MultiTierCacheBackend;
use crate::redis::RedisCacheBackend;
use crate::{CacheError, CacheResult};
use std::sync::Arc;

/// Create the backend selected by `cfg.backend`.
///
/// A standalone `redis` backend that does not answer a ping is replaced by an in-process one so
/// the service can still start. Inside a multi-tier composition it is kept as is and the
/// compositor routes around it.
///
/// # Errors
/// Returns [`CacheError::InvalidConfig`] for missing required settings or a nested multi-tier
/// entry, and [`CacheError::NotCompiled`] for `dax` without the `dynamodb` feature.
pub async fn create_cache_backend(cfg: &CacheConfig) -> CacheResult<Arc<dyn CacheBackend>> {
    if cfg.backend != CacheBackendKind::MultiTier {
        return build_single(cfg.backend, cfg, true).await;
    }

    let mut tiers = Vec::with_capacity(cfg.multi_tier_backends.len());
    let mut names = Vec::with_capacity(cfg.multi_tier_backends.len());
    for kind in &cfg.multi_tier_backends {
        if *kind == CacheBackendKind::MultiTier {
            return Err(CacheError::InvalidConfig(
                "multi-tier cache cannot contain another multi-tier cache".into(),
            ));
        }
        tiers.push(build_single(*kind, cfg, false).await?);
        names.push(kind.as_str().to_owned());
    }

    let backend = MultiTierCacheBackend::new(tiers, Some(names))?
        .with_write_through(cfg.write_through)
        .with_read_through(cfg.read_through);
    Ok(Arc::new(backend))
}

async fn build_single(
    kind: CacheBackendKind,
    cfg: &CacheConfig,
    redis_fallback: bool,
) -> CacheResult<Arc<dyn CacheBackend>> {
    match kind {
        CacheBackendKind::Memory => {
            tracing::info!("created memory cache backend");
            Ok(Arc::new(MemoryCacheBackend::default()))
        }
        CacheBackendKind::Redis => {
            let backend = RedisCacheBackend::new(cfg.redis_url.as_str(), cfg.key_prefix.as_str());
            if !redis_fallback {
                return Ok(Arc::new(backend));
            }
            if backend.ping().await {
                tracing::info!(
                    "created redis cache backend at {}",
                    backend.store().redacted_url()
                );
                Ok(Arc::new(backend))
            } else {
                tracing::warn!("redis ping failed, falling back to memory cache");
                Ok(Arc::new(MemoryCacheBackend::default()))
            }
        }
        CacheBackendKind::ElastiCache => {
            let endpoint = cfg.elasticache_endpoint.clone().ok_or_else(|| {
                CacheError::InvalidConfig("ELASTICACHE_ENDPOINT is required".into())
            })?;
            let settings = ElastiCacheSettings {
                port: cfg.elasticache_port,
                auth_token: cfg.elasticache_auth_token.clone(),
                region: cfg.aws_region.clone(),
                ..ElastiCacheSettings::new(endpoint)
            };
            tracing::info!(
                "created elasticache backend for cluster {}",
                settings.cluster_name()
            );
            Ok(Arc::new(ElastiCacheBackend::new(
                settings,
                cfg.key_prefix.as_str(),
            )))
        }
        CacheBackendKind::Dax => build_dax(cfg).await,
        CacheBackendKind::LocalDev => Ok(Arc::new(
            LocalDevCacheBackend::open(cfg.local_dev_settings()).await?,
        )),
        CacheBackendKind::LocalDevRedis => Ok(Arc::new(
            LocalDevRedisBackend::connect(
                cfg.local_dev_redis_url.as_str(),
                cfg.key_prefix.as_str(),
                cfg.local_dev_backend_type,
                cfg.local_dev_max_size,
            )
            .await,
        )),
        CacheBackendKind::MultiTier => Err(CacheError::InvalidConfig(
            "multi-tier cache cannot contain another multi-tier cache".into(),
        )),
    }
}

#[cfg(feature = "dynamodb")]
async fn build_dax(cfg: &CacheConfig) -> CacheResult<Arc<dyn CacheBackend>> {
    use crate::dax::DaxCacheBackend;
    use crate::dynamodb::DynamoDbTable;

    let endpoint = cfg.dax_endpoint.clone().unwrap_or_default();
    let table = DynamoDbTable::connect(&endpoint, &cfg.aws_region, cfg.dax_table_name.as_str()).await;
    tracing::info!(
        "created dax backend for table {} in {}",
        cfg.dax_table_name,
        cfg.aws_region
    );
    Ok(Arc::new(
        DaxCacheBackend::new(table, cfg.key_prefix.as_str())
            .with_location(endpoint, cfg.aws_region.as_str()),
    ))
}

#[cfg(not(feature = "dynamodb"))]
async fn build_dax(_cfg: &CacheConfig) -> CacheResult<Arc<dyn CacheBackend>> {
    Err(CacheError::NotCompiled("dax"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: CacheBackendKind) -> CacheConfig {
        CacheConfig {
            backend,
            redis_url: "redis://127.0.0.1:1/0".into(),
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = create_cache_backend(&config(CacheBackendKind::Memory))
            .await
            .expect("memory");
        assert_eq!(backend.kind(), "memory");
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let backend = create_cache_backend(&config(CacheBackendKind::Redis))
            .await
            .expect("fallback");
        assert_eq!(backend.kind(), "memory");
    }

    #[tokio::test]
    async fn test_elasticache_requires_endpoint() {
        let err = create_cache_backend(&config(CacheBackendKind::ElastiCache))
            .await
            .err()
            .expect("missing endpoint");
        assert!(matches!(err, CacheError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_multi_tier_builds_listed_tiers() {
        let cfg = CacheConfig {
            multi_tier_backends: vec![CacheBackendKind::Memory, CacheBackendKind::LocalDev],
            ..config(CacheBackendKind::MultiTier)
        };
        let backend = create_cache_backend(&cfg).await.expect("multi-tier");
        assert_eq!(backend.kind(), "multi-tier");
        assert!(backend.ping().await);
    }

    #[tokio::test]
    async fn test_nested_multi_tier_is_rejected() {
        let cfg = CacheConfig {
            multi_tier_backends: vec![CacheBackendKind::Memory, CacheBackendKind::MultiTier],
            ..config(CacheBackendKind::MultiTier)
        };
        assert!(matches!(
            create_cache_backend(&cfg).await,
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[cfg(not(feature = "dynamodb"))]
    #[tokio::test]
    async fn test_dax_needs_feature() {
        assert!(matches!(
            create_cache_backend(&config(CacheBackendKind::Dax)).await,
            Err(CacheError::NotCompiled("dax"))
        ));
    }
}
