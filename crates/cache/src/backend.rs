//! The capability set every cache backend implements.
//!
//! Backends store opaque JSON values under string keys. Typed access (patient data
//! collections) is layered on top by [`crate::PatientDataCache`].

use crate::CacheResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// A key/value cache with per-entry expiry.
///
/// Every method must be safe to call concurrently from many tasks. Implementations own their
/// connections and release them in [`CacheBackend::close`].
///
/// # Errors
/// Transport failures surface as [`crate::CacheError`] so that callers holding several backends
/// (the multi-tier compositor, the facade) can decide how to absorb them. A missing key is never
/// an error, and neither is a corrupted stored value: both read as a miss.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend type name used in logs and health reports (`memory`, `redis`, ...).
    fn kind(&self) -> &'static str;

    /// TTL applied when `set` is called without one.
    fn default_ttl(&self) -> Duration;

    /// Returns the value if present and unexpired.
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Stores `value`, replacing any existing entry.
    ///
    /// `None` applies [`CacheBackend::default_ttl`]; a zero duration stores without expiry.
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> CacheResult<()>;

    /// Removes `key`, returning whether it existed. Idempotent.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// True only if the key is present and unexpired.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Removes every entry created under this backend's key prefix.
    async fn clear(&self) -> CacheResult<()>;

    /// Liveness probe. Never fails out of band.
    async fn ping(&self) -> bool;

    /// Releases underlying connections. Safe to call more than once.
    async fn close(&self);

    /// Health record for monitoring. The default derives status from [`CacheBackend::ping`].
    async fn health(&self) -> BackendHealth {
        if self.ping().await {
            BackendHealth::healthy(self.kind())
        } else {
            BackendHealth::unhealthy(self.kind(), "ping failed")
        }
    }
}

/// Resolve the TTL an entry should be stored with.
///
/// Returns `None` when the entry should not expire.
pub(crate) fn effective_ttl(ttl: Option<Duration>, default_ttl: Duration) -> Option<Duration> {
    let ttl = ttl.unwrap_or(default_ttl);
    if ttl.is_zero() {
        None
    } else {
        Some(ttl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Health of a single backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub backend: String,
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Backend-specific facts: endpoint, region, table, entry counts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl BackendHealth {
    pub fn healthy(backend: &str) -> Self {
        Self {
            backend: backend.to_owned(),
            status: HealthStatus::Healthy,
            error: None,
            details: BTreeMap::new(),
        }
    }

    pub fn unhealthy(backend: &str, error: impl Into<String>) -> Self {
        Self {
            backend: backend.to_owned(),
            status: HealthStatus::Unhealthy,
            error: Some(error.into()),
            details: BTreeMap::new(),
        }
    }

    /// Serving, but not from its preferred store.
    pub fn degraded(backend: &str, reason: impl Into<String>) -> Self {
        Self {
            backend: backend.to_owned(),
            status: HealthStatus::Degraded,
            error: Some(reason.into()),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.details.insert(name.to_owned(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_ttl_defaults_and_zero() {
        let default = Duration::from_secs(300);
        assert_eq!(effective_ttl(None, default), Some(default));
        assert_eq!(
            effective_ttl(Some(Duration::from_secs(5)), default),
            Some(Duration::from_secs(5))
        );
        assert_eq!(effective_ttl(Some(Duration::ZERO), default), None);
    }

    #[test]
    fn test_health_serialises_lowercase_status() {
        let health = BackendHealth::unhealthy("redis", "connection refused")
            .with_detail("endpoint", "localhost:6379");
        let json = serde_json::to_value(&health).expect("serialize");
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["details"]["endpoint"], "localhost:6379");
    }
}
