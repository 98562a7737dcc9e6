//! In-memory backend that stands in for the hosted stores during local development.
//!
//! The store is bounded: once over `max_size` the oldest entries (by creation time) are dropped.
//! It can optionally snapshot itself to a JSON file after every write and reload it on start.

use crate::backend::{effective_ttl, BackendHealth, CacheBackend};
use crate::constants::{DEFAULT_KEY_PREFIX, DEFAULT_LOCAL_DEV_MAX_SIZE, LOCAL_DEV_DEFAULT_TTL};
use crate::key::prefixed;
use crate::{CacheError, CacheResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Hosted store a local backend is standing in for. Reported in health records only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatedBackend {
    #[default]
    Redis,
    ElastiCache,
    Dax,
}

impl SimulatedBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            SimulatedBackend::Redis => "redis",
            SimulatedBackend::ElastiCache => "elasticache",
            SimulatedBackend::Dax => "dax",
        }
    }
}

impl std::fmt::Display for SimulatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimulatedBackend {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(SimulatedBackend::Redis),
            "elasticache" => Ok(SimulatedBackend::ElastiCache),
            "dax" => Ok(SimulatedBackend::Dax),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown simulated backend type `{other}`"
            ))),
        }
    }
}

/// One entry of the local store, also the on-disk snapshot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LocalEntry {
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl LocalEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Which entries go first when the store is over capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionPolicy {
    OldestCreated,
    LeastRecentlyAccessed,
}

/// Entry counts of a local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocalStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub max_size: usize,
}

impl LocalStats {
    pub fn utilization_percent(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.total as f64 / self.max_size as f64 * 100.0
        }
    }
}

/// Bounded map shared by the local development backends. Callers provide locking.
#[derive(Debug)]
pub(crate) struct LocalStore {
    entries: HashMap<String, LocalEntry>,
    max_size: usize,
    policy: EvictionPolicy,
}

impl LocalStore {
    pub fn new(max_size: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            policy,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = Utc::now();
        match self.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove(key);
                None
            }
            Some(entry) => {
                entry.last_accessed = now;
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    pub fn contains(&mut self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(Utc::now()) => {
                self.entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Insert, then purge expired entries and enforce the size cap.
    pub fn insert(&mut self, key: String, value: Value, ttl: Option<Duration>) {
        let now = Utc::now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl));
        self.entries.insert(
            key,
            LocalEntry {
                value,
                created_at: now,
                last_accessed: now,
                expires_at,
            },
        );
        self.cleanup_expired(now);
        self.enforce_max_size();
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry under `prefix`, returning how many went.
    pub fn clear_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        before - self.entries.len()
    }

    pub fn cleanup_expired(&mut self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let purged = before - self.entries.len();
        if purged > 0 {
            tracing::debug!("purged {} expired local cache entries", purged);
        }
    }

    pub fn enforce_max_size(&mut self) {
        if self.entries.len() <= self.max_size {
            return;
        }
        let excess = self.entries.len() - self.max_size;

        let mut ranked: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|(k, e)| {
                let at = match self.policy {
                    EvictionPolicy::OldestCreated => e.created_at,
                    EvictionPolicy::LeastRecentlyAccessed => e.last_accessed,
                };
                (at, k.clone())
            })
            .collect();
        ranked.sort();

        for (_, key) in ranked.into_iter().take(excess) {
            self.entries.remove(&key);
        }
        tracing::debug!("evicted {} local cache entries over capacity", excess);
    }

    pub fn stats(&self) -> LocalStats {
        let now = Utc::now();
        let expired = self.entries.values().filter(|e| e.is_expired(now)).count();
        LocalStats {
            total: self.entries.len(),
            active: self.entries.len() - expired,
            expired,
            max_size: self.max_size,
        }
    }

    pub fn to_snapshot(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.entries)
    }

    pub fn restore(&mut self, entries: HashMap<String, LocalEntry>) {
        self.entries = entries;
        self.cleanup_expired(Utc::now());
        self.enforce_max_size();
    }
}

/// Settings of [`LocalDevCacheBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDevSettings {
    pub simulated: SimulatedBackend,
    pub key_prefix: String,
    pub max_size: usize,
    /// Snapshot file; `None` keeps the store purely in memory.
    pub persistence_file: Option<PathBuf>,
}

impl Default for LocalDevSettings {
    fn default() -> Self {
        Self {
            simulated: SimulatedBackend::default(),
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            max_size: DEFAULT_LOCAL_DEV_MAX_SIZE,
            persistence_file: None,
        }
    }
}

#[derive(Debug)]
pub struct LocalDevCacheBackend {
    settings: LocalDevSettings,
    store: Mutex<LocalStore>,
    failing: AtomicBool,
    default_ttl: Duration,
}

impl LocalDevCacheBackend {
    /// Create an empty store. Use [`LocalDevCacheBackend::open`] to reload a snapshot.
    pub fn new(settings: LocalDevSettings) -> Self {
        let store = LocalStore::new(settings.max_size, EvictionPolicy::OldestCreated);
        Self {
            settings,
            store: Mutex::new(store),
            failing: AtomicBool::new(false),
            default_ttl: LOCAL_DEV_DEFAULT_TTL,
        }
    }

    /// Create the store and load the snapshot file if persistence is enabled.
    ///
    /// A missing snapshot starts empty. An unreadable snapshot is an error; one that is not
    /// valid JSON is logged and ignored.
    pub async fn open(settings: LocalDevSettings) -> CacheResult<Self> {
        let backend = Self::new(settings);
        if let Some(path) = &backend.settings.persistence_file {
            match tokio::fs::read(path).await {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(entries) => {
                        backend.store.lock().await.restore(entries);
                        tracing::debug!("loaded local cache snapshot from {}", path.display());
                    }
                    Err(e) => {
                        tracing::error!(
                            "ignoring unreadable cache snapshot {}: {}",
                            path.display(),
                            e
                        );
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("no cache snapshot at {}, starting empty", path.display());
                }
                Err(e) => return Err(CacheError::SnapshotRead(e)),
            }
        }
        tracing::info!(
            "initialised local development cache simulating {}",
            backend.settings.simulated
        );
        Ok(backend)
    }

    pub fn settings(&self) -> &LocalDevSettings {
        &self.settings
    }

    /// Make every operation fail (and `ping` report false) until reset with `false`.
    pub fn simulate_failure(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
        if failing {
            tracing::warn!("simulating {} outage", self.settings.simulated);
        } else {
            tracing::info!("cleared simulated {} outage", self.settings.simulated);
        }
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::SimulatedFailure("local-dev"))
        } else {
            Ok(())
        }
    }

    pub async fn stats(&self) -> LocalStats {
        self.store.lock().await.stats()
    }

    /// Write the snapshot file now. Does nothing without persistence.
    pub async fn save_snapshot(&self) -> CacheResult<()> {
        let store = self.store.lock().await;
        self.persist(&store).await
    }

    async fn persist(&self, store: &LocalStore) -> CacheResult<()> {
        let Some(path) = &self.settings.persistence_file else {
            return Ok(());
        };
        let bytes = store.to_snapshot().map_err(CacheError::Serialization)?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(CacheError::SnapshotWrite)
    }

    /// Persist after a write; snapshot failures are logged and never fail the write.
    async fn persist_logged(&self, store: &LocalStore) {
        if let Err(e) = self.persist(store).await {
            tracing::error!("failed to save local cache snapshot: {}", e);
        }
    }
}

#[async_trait]
impl CacheBackend for LocalDevCacheBackend {
    fn kind(&self) -> &'static str {
        "local-dev"
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.check_available()?;
        Ok(self
            .store
            .lock()
            .await
            .get(&prefixed(&self.settings.key_prefix, key)))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> CacheResult<()> {
        self.check_available()?;
        let mut store = self.store.lock().await;
        store.insert(
            prefixed(&self.settings.key_prefix, key),
            value.clone(),
            effective_ttl(ttl, self.default_ttl),
        );
        self.persist_logged(&store).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check_available()?;
        let mut store = self.store.lock().await;
        let existed = store.remove(&prefixed(&self.settings.key_prefix, key));
        if existed {
            self.persist_logged(&store).await;
        }
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check_available()?;
        Ok(self
            .store
            .lock()
            .await
            .contains(&prefixed(&self.settings.key_prefix, key)))
    }

    async fn clear(&self) -> CacheResult<()> {
        self.check_available()?;
        let mut store = self.store.lock().await;
        let cleared = store.clear_prefix(&self.settings.key_prefix);
        self.persist_logged(&store).await;
        tracing::info!("cleared {} local cache entries", cleared);
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.check_available().is_ok()
    }

    async fn close(&self) {
        if let Err(e) = self.save_snapshot().await {
            tracing::error!("failed to save local cache snapshot on close: {}", e);
        }
    }

    async fn health(&self) -> BackendHealth {
        let stats = self.stats().await;
        let health = match self.check_available() {
            Ok(()) => BackendHealth::healthy(self.kind()),
            Err(e) => BackendHealth::unhealthy(self.kind(), e.to_string()),
        };
        health
            .with_detail("backend_type", format!("local_{}", self.settings.simulated))
            .with_detail("endpoint", "localhost")
            .with_detail("region", "local")
            .with_detail("total_entries", stats.total)
            .with_detail("active_entries", stats.active)
            .with_detail("expired_entries", stats.expired)
            .with_detail("max_size", stats.max_size)
            .with_detail("utilization_percent", stats.utilization_percent())
            .with_detail(
                "persistence_file",
                self.settings
                    .persistence_file
                    .as_ref()
                    .map(|p| p.display().to_string()),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(max_size: usize) -> LocalDevCacheBackend {
        LocalDevCacheBackend::new(LocalDevSettings {
            max_size,
            ..LocalDevSettings::default()
        })
    }

    #[tokio::test]
    async fn test_round_trip_and_expiry() {
        let cache = backend(10);
        cache.set("k", &json!([1, 2]), None).await.expect("set");
        assert_eq!(cache.get("k").await.expect("get"), Some(json!([1, 2])));

        cache
            .set("short", &json!(1), Some(Duration::from_millis(30)))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!cache.exists("short").await.expect("exists"));
        assert_eq!(cache.get("short").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_evicts_oldest_created_over_capacity() {
        let cache = backend(2);
        for key in ["a", "b", "c"] {
            cache.set(key, &json!(key), None).await.expect("set");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(cache.stats().await.total, 2);
        assert!(!cache.exists("a").await.expect("exists"));
        assert!(cache.exists("b").await.expect("exists"));
        assert!(cache.exists("c").await.expect("exists"));
    }

    #[tokio::test]
    async fn test_simulated_failure_fails_every_operation() {
        let cache = backend(10);
        cache.set("k", &json!(1), None).await.expect("set");
        cache.simulate_failure(true);

        assert!(!cache.ping().await);
        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::SimulatedFailure(_))
        ));
        assert!(cache.set("k", &json!(2), None).await.is_err());
        assert_eq!(
            cache.health().await.status,
            crate::HealthStatus::Unhealthy
        );

        cache.simulate_failure(false);
        assert_eq!(cache.get("k").await.expect("get"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = LocalDevSettings {
            persistence_file: Some(dir.path().join("local_cache.json")),
            ..LocalDevSettings::default()
        };

        let first = LocalDevCacheBackend::open(settings.clone())
            .await
            .expect("open");
        first
            .set("patient", &json!({"name": "ANDERSON"}), Some(Duration::ZERO))
            .await
            .expect("set");
        first.close().await;

        let second = LocalDevCacheBackend::open(settings).await.expect("reopen");
        assert_eq!(
            second.get("patient").await.expect("get"),
            Some(json!({"name": "ANDERSON"}))
        );
    }

    #[tokio::test]
    async fn test_garbage_snapshot_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("local_cache.json");
        std::fs::write(&path, b"not json").expect("write");

        let cache = LocalDevCacheBackend::open(LocalDevSettings {
            persistence_file: Some(path),
            ..LocalDevSettings::default()
        })
        .await
        .expect("open");
        assert_eq!(cache.stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_health_reports_simulated_type() {
        let cache = LocalDevCacheBackend::new(LocalDevSettings {
            simulated: SimulatedBackend::Dax,
            ..LocalDevSettings::default()
        });
        let health = cache.health().await;
        assert!(health.status.is_healthy());
        assert_eq!(health.details["backend_type"], "local_dax");
    }

    #[test]
    fn test_simulated_backend_from_str() {
        assert_eq!(
            "ElastiCache".parse::<SimulatedBackend>().expect("parse"),
            SimulatedBackend::ElastiCache
        );
        assert!("memcached".parse::<SimulatedBackend>().is_err());
    }

    #[test]
    fn test_lru_policy_keeps_recently_read_entries() {
        let mut store = LocalStore::new(2, EvictionPolicy::LeastRecentlyAccessed);
        store.insert("a".into(), json!(1), None);
        std::thread::sleep(Duration::from_millis(5));
        store.insert("b".into(), json!(2), None);
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get("a").is_some());
        std::thread::sleep(Duration::from_millis(5));
        store.insert("c".into(), json!(3), None);

        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
    }
}
