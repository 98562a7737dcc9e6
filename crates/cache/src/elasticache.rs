//! Clustered key-value backend (ElastiCache for Redis).
//!
//! Speaks the same protocol as [`crate::RedisCacheBackend`], connecting to a cluster endpoint
//! with an optional AUTH token.

use crate::backend::{effective_ttl, BackendHealth, CacheBackend};
use crate::constants::{DEFAULT_AWS_REGION, DEFAULT_ELASTICACHE_PORT, ELASTICACHE_DEFAULT_TTL};
use crate::redis::RedisStore;
use crate::CacheResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Connection settings for a clustered store.
#[derive(Clone, PartialEq, Eq)]
pub struct ElastiCacheSettings {
    pub endpoint: String,
    pub port: u16,
    pub auth_token: Option<String>,
    pub region: String,
}

impl std::fmt::Debug for ElastiCacheSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElastiCacheSettings")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("region", &self.region)
            .finish()
    }
}

impl ElastiCacheSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            port: DEFAULT_ELASTICACHE_PORT,
            auth_token: None,
            region: DEFAULT_AWS_REGION.to_owned(),
        }
    }

    /// Connection URL, `redis://:{token}@{endpoint}:{port}/0` when a token is set.
    pub fn connection_url(&self) -> String {
        match self.auth_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => format!(
                "redis://:{}@{}:{}/0",
                encode_userinfo(token),
                self.endpoint,
                self.port
            ),
            None => format!("redis://{}:{}/0", self.endpoint, self.port),
        }
    }

    /// Cluster identifier, the first label of the endpoint host name.
    pub fn cluster_name(&self) -> &str {
        self.endpoint.split('.').next().unwrap_or(&self.endpoint)
    }
}

/// Percent-encode characters that would break the userinfo part of a URL.
fn encode_userinfo(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[derive(Debug)]
pub struct ElastiCacheBackend {
    settings: ElastiCacheSettings,
    store: RedisStore,
    default_ttl: Duration,
}

impl ElastiCacheBackend {
    pub fn new(settings: ElastiCacheSettings, key_prefix: impl Into<String>) -> Self {
        let store = RedisStore::new(settings.connection_url(), key_prefix);
        Self {
            settings,
            store,
            default_ttl: ELASTICACHE_DEFAULT_TTL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.store = self.store.with_timeout(timeout);
        self
    }

    pub fn settings(&self) -> &ElastiCacheSettings {
        &self.settings
    }

    /// Cluster health: reachability plus where the cluster lives.
    pub async fn cluster_health(&self) -> BackendHealth {
        let health = match self.store.connect().await {
            Ok(()) => BackendHealth::healthy(self.kind()),
            Err(e) => BackendHealth::unhealthy(self.kind(), e.to_string()),
        };
        health
            .with_detail("cluster", self.settings.cluster_name())
            .with_detail("endpoint", self.settings.endpoint.as_str())
            .with_detail("port", self.settings.port)
            .with_detail("region", self.settings.region.as_str())
            .with_detail("auth", self.settings.auth_token.is_some())
    }
}

#[async_trait]
impl CacheBackend for ElastiCacheBackend {
    fn kind(&self) -> &'static str {
        "elasticache"
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.store.get(key).await
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> CacheResult<()> {
        self.store
            .set(key, value, effective_ttl(ttl, self.default_ttl))
            .await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.store.delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.store.exists(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.store.clear().await.map(|_| ())
    }

    async fn ping(&self) -> bool {
        self.store.ping().await
    }

    async fn close(&self) {
        self.store.close().await;
    }

    async fn health(&self) -> BackendHealth {
        self.cluster_health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_without_token() {
        let settings = ElastiCacheSettings::new("vista.abc123.cache.amazonaws.com");
        assert_eq!(
            settings.connection_url(),
            "redis://vista.abc123.cache.amazonaws.com:6379/0"
        );
        assert_eq!(settings.cluster_name(), "vista");
    }

    #[test]
    fn test_connection_url_with_token() {
        let settings = ElastiCacheSettings {
            auth_token: Some("s3cr@t/x".into()),
            port: 6380,
            ..ElastiCacheSettings::new("cache.internal")
        };
        assert_eq!(
            settings.connection_url(),
            "redis://:s3cr%40t%2Fx@cache.internal:6380/0"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let settings = ElastiCacheSettings {
            auth_token: Some("secret".into()),
            ..ElastiCacheSettings::new("cache.internal")
        };
        assert!(!format!("{settings:?}").contains("secret"));
    }

    #[tokio::test]
    async fn test_cluster_health_reports_location_when_down() {
        let settings = ElastiCacheSettings {
            port: 1,
            region: "us-gov-west-1".into(),
            ..ElastiCacheSettings::new("127.0.0.1")
        };
        let backend = ElastiCacheBackend::new(settings, "mcp:")
            .with_timeout(Duration::from_millis(500));
        let health = backend.health().await;
        assert_eq!(health.status, crate::HealthStatus::Unhealthy);
        assert_eq!(health.details["region"], "us-gov-west-1");
        assert_eq!(backend.default_ttl(), Duration::from_secs(7200));
    }
}
