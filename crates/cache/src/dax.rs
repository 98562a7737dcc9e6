//! Accelerated-table cache backend (DynamoDB Accelerator).
//!
//! Entries are items in a single table keyed by `cache_key`. Expiry is an explicit epoch-seconds
//! attribute checked on read, so the backend never depends on the store's own TTL sweeper.
//! The table itself sits behind [`ItemTable`] so the expiry, corruption, and prefix-scan
//! behaviour is independent of the AWS client.

use crate::backend::{effective_ttl, BackendHealth, CacheBackend};
use crate::constants::{DAX_DEFAULT_TTL, DEFAULT_AWS_REGION, DEFAULT_DAX_TABLE_NAME};
use crate::key::prefixed;
use crate::{CacheError, CacheResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// One stored cache item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    pub cache_key: String,
    /// JSON text of the cached value.
    pub cache_value: String,
    /// Epoch seconds.
    pub created_at: i64,
    /// Epoch seconds; absent means the item never expires.
    pub expires_at: Option<i64>,
}

impl CacheItem {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// One page of a prefix scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// Resume point for the next page; `None` when the scan is complete.
    pub last_evaluated_key: Option<String>,
}

/// Item-level operations the accelerated-table backend needs from its store.
#[async_trait]
pub trait ItemTable: Send + Sync {
    fn table_name(&self) -> &str;

    async fn get_item(&self, cache_key: &str) -> CacheResult<Option<CacheItem>>;

    async fn put_item(&self, item: CacheItem) -> CacheResult<()>;

    /// Delete an item, returning whether it existed beforehand.
    async fn delete_item(&self, cache_key: &str) -> CacheResult<bool>;

    /// Scan keys beginning with `prefix`, starting after `start` if given.
    async fn scan_prefix(&self, prefix: &str, start: Option<String>) -> CacheResult<ScanPage>;

    /// Verify the table is reachable.
    async fn describe(&self) -> CacheResult<()>;

    /// Create the table if missing. Returns `true` if it was created.
    async fn create_table(&self) -> CacheResult<bool>;
}

/// Process-local [`ItemTable`], used for tests and local development.
#[derive(Debug)]
pub struct MemoryItemTable {
    name: String,
    page_size: usize,
    items: Mutex<BTreeMap<String, CacheItem>>,
}

impl Default for MemoryItemTable {
    fn default() -> Self {
        Self::new(DEFAULT_DAX_TABLE_NAME)
    }
}

impl MemoryItemTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            page_size: 100,
            items: Mutex::new(BTreeMap::new()),
        }
    }

    /// Limit scan pages so pagination can be exercised.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[async_trait]
impl ItemTable for MemoryItemTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    async fn get_item(&self, cache_key: &str) -> CacheResult<Option<CacheItem>> {
        Ok(self.items.lock().await.get(cache_key).cloned())
    }

    async fn put_item(&self, item: CacheItem) -> CacheResult<()> {
        self.items
            .lock()
            .await
            .insert(item.cache_key.clone(), item);
        Ok(())
    }

    async fn delete_item(&self, cache_key: &str) -> CacheResult<bool> {
        Ok(self.items.lock().await.remove(cache_key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str, start: Option<String>) -> CacheResult<ScanPage> {
        use std::ops::Bound;

        let items = self.items.lock().await;
        let lower = match &start {
            Some(after) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };

        let mut keys = Vec::new();
        let mut last_seen = None;
        let mut more = false;
        for key in items.range((lower, Bound::Unbounded)).map(|(k, _)| k) {
            if keys.len() == self.page_size {
                more = true;
                break;
            }
            last_seen = Some(key.clone());
            if key.starts_with(prefix) {
                keys.push(key.clone());
            }
        }

        Ok(ScanPage {
            keys,
            last_evaluated_key: if more { last_seen } else { None },
        })
    }

    async fn describe(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn create_table(&self) -> CacheResult<bool> {
        Ok(false)
    }
}

fn now_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Cache backend storing entries as items in an accelerated table.
#[derive(Debug)]
pub struct DaxCacheBackend<T: ItemTable> {
    table: T,
    key_prefix: String,
    endpoint: String,
    region: String,
    default_ttl: Duration,
}

impl<T: ItemTable> DaxCacheBackend<T> {
    pub fn new(table: T, key_prefix: impl Into<String>) -> Self {
        Self {
            table,
            key_prefix: key_prefix.into(),
            endpoint: String::new(),
            region: DEFAULT_AWS_REGION.to_owned(),
            default_ttl: DAX_DEFAULT_TTL,
        }
    }

    /// Record where the cluster lives, for health reports.
    pub fn with_location(mut self, endpoint: impl Into<String>, region: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self.region = region.into();
        self
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    fn make_item(&self, full_key: String, value: &Value, ttl: Option<Duration>) -> CacheResult<CacheItem> {
        let now = now_epoch_secs();
        let cache_value = serde_json::to_string(value).map_err(CacheError::Serialization)?;
        let expires_at = effective_ttl(ttl, self.default_ttl)
            .map(|ttl| now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)));
        Ok(CacheItem {
            cache_key: full_key,
            cache_value,
            created_at: now,
            expires_at,
        })
    }

    /// Provision the backing table if it does not exist yet.
    pub async fn create_cache_table(&self) -> CacheResult<bool> {
        let created = self.table.create_table().await?;
        if created {
            tracing::info!("created cache table {}", self.table.table_name());
        } else {
            tracing::info!("cache table {} already exists", self.table.table_name());
        }
        Ok(created)
    }

    pub async fn cluster_health(&self) -> BackendHealth {
        let health = match self.table.describe().await {
            Ok(()) => BackendHealth::healthy("dax"),
            Err(e) => BackendHealth::unhealthy("dax", e.to_string()),
        };
        health
            .with_detail("endpoint", self.endpoint.as_str())
            .with_detail("region", self.region.as_str())
            .with_detail("table_name", self.table.table_name())
    }
}

#[async_trait]
impl<T: ItemTable> CacheBackend for DaxCacheBackend<T> {
    fn kind(&self) -> &'static str {
        "dax"
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let full_key = prefixed(&self.key_prefix, key);
        let Some(item) = self.table.get_item(&full_key).await? else {
            return Ok(None);
        };

        if item.is_expired(now_epoch_secs()) {
            self.table.delete_item(&full_key).await?;
            return Ok(None);
        }

        match serde_json::from_str(&item.cache_value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("corrupted cache item {}: {}; deleting", full_key, e);
                self.table.delete_item(&full_key).await?;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> CacheResult<()> {
        let item = self.make_item(prefixed(&self.key_prefix, key), value, ttl)?;
        self.table.put_item(item).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.table
            .delete_item(&prefixed(&self.key_prefix, key))
            .await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let full_key = prefixed(&self.key_prefix, key);
        match self.table.get_item(&full_key).await? {
            Some(item) if item.is_expired(now_epoch_secs()) => {
                self.table.delete_item(&full_key).await?;
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut start = None;
        let mut deleted = 0usize;
        loop {
            let page = self.table.scan_prefix(&self.key_prefix, start).await?;
            for key in &page.keys {
                match self.table.delete_item(key).await {
                    Ok(_) => deleted += 1,
                    Err(e) => tracing::warn!("failed to delete cache item {}: {}", key, e),
                }
            }
            match page.last_evaluated_key {
                Some(next) => start = Some(next),
                None => break,
            }
        }
        tracing::info!(
            "cleared {} cache items with prefix {:?}",
            deleted,
            self.key_prefix
        );
        Ok(())
    }

    async fn ping(&self) -> bool {
        match self.table.describe().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("dax ping failed: {}", e);
                false
            }
        }
    }

    async fn close(&self) {
        tracing::debug!("closed dax backend for table {}", self.table.table_name());
    }

    async fn health(&self) -> BackendHealth {
        self.cluster_health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> DaxCacheBackend<MemoryItemTable> {
        DaxCacheBackend::new(MemoryItemTable::default(), "mcp:")
    }

    #[tokio::test]
    async fn test_round_trip_and_item_shape() {
        let cache = backend();
        cache.set("k", &json!({"a": 1}), None).await.expect("set");
        assert_eq!(cache.get("k").await.expect("get"), Some(json!({"a": 1})));

        let item = cache
            .table()
            .get_item("mcp:k")
            .await
            .expect("get_item")
            .expect("stored");
        assert_eq!(item.cache_value, r#"{"a":1}"#);
        assert_eq!(item.expires_at, Some(item.created_at + 3600));
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates_expiry() {
        let cache = backend();
        let near_max = Duration::from_secs(u64::try_from(i64::MAX - 10).expect("fits"));
        cache.set("k", &json!(1), Some(near_max)).await.expect("set");
        cache.set("m", &json!(2), Some(Duration::MAX)).await.expect("set");

        for key in ["mcp:k", "mcp:m"] {
            let item = cache
                .table()
                .get_item(key)
                .await
                .expect("get_item")
                .expect("stored");
            assert_eq!(item.expires_at, Some(i64::MAX));
        }
        assert_eq!(cache.get("k").await.expect("get"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_expired_item_is_deleted_on_read() {
        let cache = backend();
        let now = now_epoch_secs();
        cache
            .table()
            .put_item(CacheItem {
                cache_key: "mcp:old".into(),
                cache_value: "1".into(),
                created_at: now - 100,
                expires_at: Some(now - 10),
            })
            .await
            .expect("put");

        assert!(!cache.exists("old").await.expect("exists"));
        assert!(cache.table().is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_get_returns_none() {
        let cache = backend();
        let now = now_epoch_secs();
        cache
            .table()
            .put_item(CacheItem {
                cache_key: "mcp:old".into(),
                cache_value: "1".into(),
                created_at: now - 100,
                expires_at: Some(now - 1),
            })
            .await
            .expect("put");
        assert_eq!(cache.get("old").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_corrupted_item_is_a_miss_and_removed() {
        let cache = backend();
        cache
            .table()
            .put_item(CacheItem {
                cache_key: "mcp:bad".into(),
                cache_value: "{truncated".into(),
                created_at: now_epoch_secs(),
                expires_at: None,
            })
            .await
            .expect("put");

        assert_eq!(cache.get("bad").await.expect("get"), None);
        assert!(cache.table().is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let cache = backend();
        cache.set("k", &json!(1), None).await.expect("set");
        assert!(cache.delete("k").await.expect("delete"));
        assert!(!cache.delete("k").await.expect("delete"));
    }

    #[tokio::test]
    async fn test_clear_only_removes_own_prefix_across_pages() {
        let cache = DaxCacheBackend::new(MemoryItemTable::default().with_page_size(2), "mcp:");
        for i in 0..5 {
            cache.set(&format!("k{i}"), &json!(i), None).await.expect("set");
        }
        cache
            .table()
            .put_item(CacheItem {
                cache_key: "other:k".into(),
                cache_value: "1".into(),
                created_at: now_epoch_secs(),
                expires_at: None,
            })
            .await
            .expect("put");

        cache.clear().await.expect("clear");

        assert_eq!(cache.table().len().await, 1);
        assert!(cache
            .table()
            .get_item("other:k")
            .await
            .expect("get_item")
            .is_some());
    }

    #[tokio::test]
    async fn test_health_reports_table() {
        let cache = backend().with_location("vista.dax.local", "us-east-1");
        let health = cache.health().await;
        assert!(health.status.is_healthy());
        assert_eq!(health.details["table_name"], "vista_cache");
        assert!(cache.ping().await);
        assert!(!cache.create_cache_table().await.expect("create"));
    }
}
