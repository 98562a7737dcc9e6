//! Patient-data-specific view over a cache backend.
//!
//! [`PatientDataCache`] derives storage keys from a [`PatientCacheKey`] and applies the configured
//! patient TTL. It absorbs backend failures: a read that fails is a miss, a write that fails
//! returns `false`. Callers never need to handle cache outages.

use crate::backend::{BackendHealth, CacheBackend};
use crate::config::CacheConfig;
use crate::factory::create_cache_backend;
use crate::key::PatientCacheKey;
use crate::CacheResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

#[derive(Clone)]
pub struct PatientDataCache {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
}

impl std::fmt::Debug for PatientDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatientDataCache")
            .field("backend", &self.backend.kind())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl PatientDataCache {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self {
            backend,
            default_ttl,
        }
    }

    /// Build the configured backend and wrap it with the configured patient TTL.
    pub async fn from_config(cfg: &CacheConfig) -> CacheResult<Self> {
        let backend = create_cache_backend(cfg).await?;
        tracing::info!(
            "patient data cache ready on {} backend, ttl {:?}",
            backend.kind(),
            cfg.patient_ttl
        );
        Ok(Self::new(backend, cfg.patient_ttl))
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Cached data for `key`, or `None` on a miss.
    ///
    /// A stored value that no longer deserializes into `T` is treated as a miss and deleted.
    pub async fn get_patient_data<T>(&self, key: &PatientCacheKey) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let rendered = key.render();
        let value = match self.backend.get(&rendered).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!("patient cache miss for {}", rendered);
                return None;
            }
            Err(e) => {
                tracing::warn!("patient cache read failed for {}: {}", rendered, e);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(data) => {
                tracing::debug!("patient cache hit for {}", rendered);
                Some(data)
            }
            Err(e) => {
                tracing::warn!("discarding undecodable patient cache entry {}: {}", rendered, e);
                if let Err(e) = self.backend.delete(&rendered).await {
                    tracing::warn!("failed to delete patient cache entry {}: {}", rendered, e);
                }
                None
            }
        }
    }

    /// Store `data` under `key`. `ttl` overrides the configured patient TTL.
    ///
    /// # Returns
    /// `true` if the backend accepted the write.
    pub async fn set_patient_data<T>(
        &self,
        key: &PatientCacheKey,
        data: &T,
        ttl: Option<Duration>,
    ) -> bool
    where
        T: Serialize + ?Sized,
    {
        let rendered = key.render();
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("patient data for {} is not serialisable: {}", rendered, e);
                return false;
            }
        };

        match self
            .backend
            .set(&rendered, &value, Some(ttl.unwrap_or(self.default_ttl)))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("patient cache write failed for {}: {}", rendered, e);
                false
            }
        }
    }

    /// Remove cached data, returning whether anything was cached.
    pub async fn invalidate_patient_data(&self, key: &PatientCacheKey) -> bool {
        let rendered = key.render();
        match self.backend.delete(&rendered).await {
            Ok(existed) => {
                tracing::info!("invalidated patient cache entry {} (existed: {})", rendered, existed);
                existed
            }
            Err(e) => {
                tracing::warn!("patient cache invalidation failed for {}: {}", rendered, e);
                false
            }
        }
    }

    pub async fn has_patient_data(&self, key: &PatientCacheKey) -> bool {
        let rendered = key.render();
        match self.backend.exists(&rendered).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("patient cache lookup failed for {}: {}", rendered, e);
                false
            }
        }
    }

    pub async fn health(&self) -> BackendHealth {
        self.backend.health().await
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }
}

/// A [`PatientDataCache`] built on first use.
///
/// Concurrent first callers all wait on the same construction and receive the same instance.
/// Owned by whoever constructs it (usually application state), not a process global.
#[derive(Debug)]
pub struct LazyPatientDataCache {
    config: CacheConfig,
    cell: OnceCell<PatientDataCache>,
}

impl LazyPatientDataCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    /// The cache, constructing it if this is the first call.
    ///
    /// # Errors
    /// Propagates backend construction failures. A failed construction is retried by the next
    /// caller.
    pub async fn get(&self) -> CacheResult<&PatientDataCache> {
        self.cell
            .get_or_try_init(|| PatientDataCache::from_config(&self.config))
            .await
    }

    pub fn initialised(&self) -> Option<&PatientDataCache> {
        self.cell.get()
    }
}
