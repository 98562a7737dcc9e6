//! Local development backend that prefers a real Redis and falls back to memory.
//!
//! Every write is mirrored into a bounded in-memory store, so when the server disappears
//! mid-session reads continue from the mirror. Operations on this backend never fail.

use crate::backend::{effective_ttl, BackendHealth, CacheBackend};
use crate::constants::{LOCAL_DEV_REDIS_DEFAULT_TTL, LOCAL_DEV_REDIS_TIMEOUT};
use crate::key::prefixed;
use crate::local_dev::{EvictionPolicy, LocalStore, SimulatedBackend};
use crate::redis::RedisStore;
use crate::{CacheError, CacheResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct LocalDevRedisBackend {
    redis: RedisStore,
    available: AtomicBool,
    memory: Mutex<LocalStore>,
    key_prefix: String,
    simulated: SimulatedBackend,
    default_ttl: Duration,
}

impl LocalDevRedisBackend {
    /// Build the backend and probe the store once. An unreachable store is not an error.
    pub async fn connect(
        url: impl Into<String>,
        key_prefix: impl Into<String>,
        simulated: SimulatedBackend,
        max_size: usize,
    ) -> Self {
        let key_prefix = key_prefix.into();
        let redis = RedisStore::new(url, key_prefix.clone()).with_timeout(LOCAL_DEV_REDIS_TIMEOUT);
        let available = match redis.connect().await {
            Ok(()) => {
                tracing::info!("local cache using redis at {}", redis.redacted_url());
                true
            }
            Err(e) => {
                tracing::warn!(
                    "redis at {} unavailable ({}); falling back to in-memory cache",
                    redis.redacted_url(),
                    e
                );
                false
            }
        };

        Self {
            redis,
            available: AtomicBool::new(available),
            memory: Mutex::new(LocalStore::new(
                max_size,
                EvictionPolicy::LeastRecentlyAccessed,
            )),
            key_prefix,
            simulated,
            default_ttl: LOCAL_DEV_REDIS_DEFAULT_TTL,
        }
    }

    /// Whether operations currently go to the network store.
    pub fn redis_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Record a store failure and switch to memory for the rest of the session.
    fn fall_back(&self, op: &str, err: &CacheError) {
        if self.available.swap(false, Ordering::SeqCst) {
            tracing::warn!("redis {} failed ({}); switching to in-memory cache", op, err);
        }
    }

    fn memory_key(&self, key: &str) -> String {
        prefixed(&self.key_prefix, key)
    }
}

#[async_trait]
impl CacheBackend for LocalDevRedisBackend {
    fn kind(&self) -> &'static str {
        "local-dev-redis"
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        if self.redis_available() {
            match self.redis.get(key).await {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(e) => self.fall_back("get", &e),
            }
        }
        Ok(self.memory.lock().await.get(&self.memory_key(key)))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> CacheResult<()> {
        let ttl = effective_ttl(ttl, self.default_ttl);
        if self.redis_available() {
            if let Err(e) = self.redis.set(key, value, ttl).await {
                self.fall_back("set", &e);
            }
        }
        self.memory
            .lock()
            .await
            .insert(self.memory_key(key), value.clone(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut existed = false;
        if self.redis_available() {
            match self.redis.delete(key).await {
                Ok(found) => existed = found,
                Err(e) => self.fall_back("delete", &e),
            }
        }
        let in_memory = self.memory.lock().await.remove(&self.memory_key(key));
        Ok(existed || in_memory)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        if self.redis_available() {
            match self.redis.exists(key).await {
                Ok(found) => return Ok(found),
                Err(e) => self.fall_back("exists", &e),
            }
        }
        Ok(self.memory.lock().await.contains(&self.memory_key(key)))
    }

    async fn clear(&self) -> CacheResult<()> {
        if self.redis_available() {
            if let Err(e) = self.redis.clear().await {
                self.fall_back("clear", &e);
            }
        }
        let cleared = self.memory.lock().await.clear_prefix(&self.key_prefix);
        tracing::info!("cleared {} mirrored cache entries", cleared);
        Ok(())
    }

    /// Always true: memory emulation is available even when the store is not.
    async fn ping(&self) -> bool {
        if self.redis_available() {
            if let Err(e) = self.redis.connect().await {
                self.fall_back("ping", &e);
            }
        }
        true
    }

    async fn close(&self) {
        self.redis.close().await;
    }

    async fn health(&self) -> BackendHealth {
        if self.redis_available() {
            match self.redis.connect().await {
                Ok(()) => {
                    return BackendHealth::healthy(self.kind())
                        .with_detail("backend_type", format!("redis_{}", self.simulated))
                        .with_detail("endpoint", self.redis.redacted_url())
                        .with_detail("region", "local");
                }
                Err(e) => self.fall_back("health check", &e),
            }
        }

        let stats = self.memory.lock().await.stats();
        BackendHealth::degraded(self.kind(), "redis unavailable; serving from memory")
            .with_detail("backend_type", format!("local_{}", self.simulated))
            .with_detail("endpoint", "localhost")
            .with_detail("region", "local")
            .with_detail("total_entries", stats.total)
            .with_detail("active_entries", stats.active)
            .with_detail("expired_entries", stats.expired)
            .with_detail("max_size", stats.max_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HealthStatus;
    use serde_json::json;

    async fn offline() -> LocalDevRedisBackend {
        LocalDevRedisBackend::connect("redis://127.0.0.1:1/0", "mcp:", SimulatedBackend::Redis, 2)
            .await
    }

    #[tokio::test]
    async fn test_unreachable_store_falls_back_to_memory() {
        let cache = offline().await;
        assert!(!cache.redis_available());

        cache.set("k", &json!({"v": 1}), None).await.expect("set");
        assert_eq!(cache.get("k").await.expect("get"), Some(json!({"v": 1})));
        assert!(cache.exists("k").await.expect("exists"));
        assert!(cache.ping().await);
        assert!(cache.delete("k").await.expect("delete"));
        assert!(!cache.delete("k").await.expect("delete"));
    }

    #[tokio::test]
    async fn test_health_is_degraded_without_store() {
        let cache = offline().await;
        let health = cache.health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.details["backend_type"], "local_redis");
        assert_eq!(cache.default_ttl(), Duration::from_secs(15 * 60));
    }

    #[tokio::test]
    async fn test_memory_mirror_evicts_least_recently_used() {
        let cache = offline().await;
        cache.set("a", &json!(1), None).await.expect("set");
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set("b", &json!(2), None).await.expect("set");
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.get("a").await.expect("get");
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set("c", &json!(3), None).await.expect("set");

        assert!(cache.exists("a").await.expect("exists"));
        assert!(!cache.exists("b").await.expect("exists"));
    }
}
