//! In-process cache backend.
//!
//! Entries live in a map owned by this backend instance, so nothing outside it is affected by
//! `clear`. Expired entries are evicted lazily by the read that finds them.

use crate::backend::{effective_ttl, BackendHealth, CacheBackend};
use crate::constants::MEMORY_DEFAULT_TTL;
use crate::CacheResult;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Entry counts reported by [`MemoryCacheBackend::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
}

#[derive(Debug)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    default_ttl: Duration,
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new(MEMORY_DEFAULT_TTL)
    }
}

impl MemoryCacheBackend {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    pub async fn stats(&self) -> MemoryStats {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();
        MemoryStats {
            total: entries.len(),
            active: entries.len() - expired,
            expired,
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at =
            effective_ttl(ttl, self.default_ttl).and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.lock().await.insert(
            key.to_owned(),
            MemoryEntry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        self.entries.lock().await.clear();
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn close(&self) {
        self.entries.lock().await.clear();
    }

    async fn health(&self) -> BackendHealth {
        let stats = self.stats().await;
        BackendHealth::healthy(self.kind())
            .with_detail("total_entries", stats.total)
            .with_detail("active_entries", stats.active)
            .with_detail("expired_entries", stats.expired)
    }
}
