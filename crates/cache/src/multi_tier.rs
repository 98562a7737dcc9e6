//! Ordered composition of cache backends, fastest tier first.
//!
//! Reads probe tiers in order and, with read-through enabled, copy a hit found in a slower tier
//! back into every faster tier on a detached task. Writes either go to every tier concurrently
//! (write-through) or only to the fastest. A fan-out succeeds when at least one tier does.

use crate::backend::{BackendHealth, CacheBackend, HealthStatus};
use crate::{CacheError, CacheResult};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

struct Tier {
    name: String,
    backend: Arc<dyn CacheBackend>,
}

/// Health of one named tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedTierHealth {
    pub name: String,
    #[serde(flatten)]
    pub health: BackendHealth,
}

/// Aggregate health across tiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierHealth {
    pub overall_status: HealthStatus,
    pub total_tiers: usize,
    pub available_tiers: usize,
    pub tiers: Vec<NamedTierHealth>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierDescriptor {
    pub name: String,
    pub backend_type: &'static str,
    pub index: usize,
}

/// Static description of the composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierInfo {
    pub tier_count: usize,
    pub tiers: Vec<TierDescriptor>,
    pub write_through: bool,
    pub read_through: bool,
}

pub struct MultiTierCacheBackend {
    tiers: Vec<Tier>,
    write_through: bool,
    read_through: bool,
}

impl std::fmt::Debug for MultiTierCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiTierCacheBackend")
            .field("tiers", &self.tier_names())
            .field("write_through", &self.write_through)
            .field("read_through", &self.read_through)
            .finish()
    }
}

impl MultiTierCacheBackend {
    /// Compose `backends` (fastest first). Names default to `tier_{i}`.
    ///
    /// # Errors
    /// [`CacheError::InvalidConfig`] if there are no backends, or if `names` is given with a
    /// different length.
    pub fn new(
        backends: Vec<Arc<dyn CacheBackend>>,
        names: Option<Vec<String>>,
    ) -> CacheResult<Self> {
        if backends.is_empty() {
            return Err(CacheError::InvalidConfig(
                "multi-tier cache needs at least one tier".into(),
            ));
        }
        let names =
            names.unwrap_or_else(|| (0..backends.len()).map(|i| format!("tier_{i}")).collect());
        if names.len() != backends.len() {
            return Err(CacheError::InvalidConfig(format!(
                "{} tier names given for {} tiers",
                names.len(),
                backends.len()
            )));
        }

        let tiers: Vec<Tier> = names
            .into_iter()
            .zip(backends)
            .map(|(name, backend)| Tier { name, backend })
            .collect();
        let backend = Self {
            tiers,
            write_through: true,
            read_through: true,
        };
        tracing::info!(
            "initialised multi-tier cache with tiers {:?}",
            backend.tier_names()
        );
        Ok(backend)
    }

    pub fn with_write_through(mut self, enabled: bool) -> Self {
        self.write_through = enabled;
        self
    }

    pub fn with_read_through(mut self, enabled: bool) -> Self {
        self.read_through = enabled;
        self
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name.as_str()).collect()
    }

    fn fastest(&self) -> &Tier {
        &self.tiers[0]
    }

    /// Copy a value found in tier `source` into every faster tier, without waiting.
    fn spawn_backfill(&self, key: &str, value: &Value, source: usize) {
        let ttl = self.tiers[source].backend.default_ttl();
        let source_name = self.tiers[source].name.clone();
        let targets: Vec<(String, Arc<dyn CacheBackend>)> = self.tiers[..source]
            .iter()
            .map(|t| (t.name.clone(), Arc::clone(&t.backend)))
            .collect();
        let key = key.to_owned();
        let value = value.clone();

        tokio::spawn(async move {
            for (name, backend) in targets {
                match backend.set(&key, &value, Some(ttl)).await {
                    Ok(()) => {
                        tracing::debug!("back-filled tier {} from tier {}", name, source_name)
                    }
                    Err(e) => tracing::warn!("failed to back-fill tier {}: {}", name, e),
                }
            }
        });
    }

    pub async fn tier_health(&self) -> TierHealth {
        let reports = join_all(self.tiers.iter().map(|t| t.backend.health())).await;
        let tiers: Vec<NamedTierHealth> = self
            .tiers
            .iter()
            .zip(reports)
            .map(|(t, health)| NamedTierHealth {
                name: t.name.clone(),
                health,
            })
            .collect();

        let available_tiers = tiers.iter().filter(|t| t.health.status.is_healthy()).count();
        let overall_status = if available_tiers == tiers.len() {
            HealthStatus::Healthy
        } else if available_tiers == 0 {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };

        TierHealth {
            overall_status,
            total_tiers: tiers.len(),
            available_tiers,
            tiers,
        }
    }

    pub fn tier_info(&self) -> TierInfo {
        TierInfo {
            tier_count: self.tiers.len(),
            tiers: self
                .tiers
                .iter()
                .enumerate()
                .map(|(index, t)| TierDescriptor {
                    name: t.name.clone(),
                    backend_type: t.backend.kind(),
                    index,
                })
                .collect(),
            write_through: self.write_through,
            read_through: self.read_through,
        }
    }

    /// Count successes of a fan-out, logging each failure against its tier.
    fn tally<T>(&self, op: &str, results: Vec<CacheResult<T>>) -> Vec<T> {
        results
            .into_iter()
            .zip(&self.tiers)
            .filter_map(|(result, tier)| match result {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("{} failed on tier {}: {}", op, tier.name, e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl CacheBackend for MultiTierCacheBackend {
    fn kind(&self) -> &'static str {
        "multi-tier"
    }

    fn default_ttl(&self) -> Duration {
        self.fastest().backend.default_ttl()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        for (i, tier) in self.tiers.iter().enumerate() {
            match tier.backend.get(key).await {
                Ok(Some(value)) => {
                    tracing::debug!("cache hit on tier {} for {}", tier.name, key);
                    if self.read_through && i > 0 {
                        self.spawn_backfill(key, &value, i);
                    }
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("read from tier {} failed: {}", tier.name, e),
            }
        }
        tracing::debug!("cache miss on all tiers for {}", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> CacheResult<()> {
        if !self.write_through {
            return self.fastest().backend.set(key, value, ttl).await;
        }

        let results = join_all(self.tiers.iter().map(|t| t.backend.set(key, value, ttl))).await;
        let written = self.tally("write", results).len();
        if written == 0 {
            tracing::error!("failed to cache {} on any tier", key);
            return Err(CacheError::Unavailable(format!(
                "write failed on all {} tiers",
                self.tiers.len()
            )));
        }
        tracing::debug!("cached {} on {}/{} tiers", key, written, self.tiers.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let results = join_all(self.tiers.iter().map(|t| t.backend.delete(key))).await;
        let outcomes = self.tally("delete", results);
        if outcomes.is_empty() {
            return Err(CacheError::Unavailable(format!(
                "delete failed on all {} tiers",
                self.tiers.len()
            )));
        }
        Ok(outcomes.into_iter().any(|existed| existed))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        for tier in &self.tiers {
            match tier.backend.exists(key).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => tracing::warn!("exists on tier {} failed: {}", tier.name, e),
            }
        }
        Ok(false)
    }

    async fn clear(&self) -> CacheResult<()> {
        let results = join_all(self.tiers.iter().map(|t| t.backend.clear())).await;
        let cleared = self.tally("clear", results).len();
        if cleared == 0 {
            tracing::error!("failed to clear any cache tier");
            return Err(CacheError::Unavailable(format!(
                "clear failed on all {} tiers",
                self.tiers.len()
            )));
        }
        tracing::info!("cleared {}/{} cache tiers", cleared, self.tiers.len());
        Ok(())
    }

    async fn ping(&self) -> bool {
        for tier in &self.tiers {
            if tier.backend.ping().await {
                return true;
            }
            tracing::warn!("cache tier {} is unreachable", tier.name);
        }
        tracing::error!("all cache tiers are unreachable");
        false
    }

    async fn close(&self) {
        join_all(self.tiers.iter().map(|t| t.backend.close())).await;
        tracing::info!("closed all cache tiers");
    }

    async fn health(&self) -> BackendHealth {
        let report = self.tier_health().await;
        let mut health = BackendHealth::healthy(self.kind());
        health.status = report.overall_status;
        if !report.overall_status.is_healthy() {
            health.error = Some(format!(
                "{}/{} tiers available",
                report.available_tiers, report.total_tiers
            ));
        }
        health
            .with_detail("available_tiers", report.available_tiers)
            .with_detail("total_tiers", report.total_tiers)
            .with_detail(
                "tiers",
                serde_json::to_value(&report.tiers).unwrap_or(Value::Null),
            )
    }
}
