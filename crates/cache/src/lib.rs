//! # VPR Cache
//!
//! Caching for patient data collections fetched from VistA.
//!
//! ## Backends
//! Every backend implements [`CacheBackend`]:
//! - [`MemoryCacheBackend`]: in-process map
//! - [`RedisCacheBackend`]: single Redis node
//! - [`ElastiCacheBackend`]: ElastiCache cluster with AUTH token
//! - [`DaxCacheBackend`]: DynamoDB Accelerator table (real client behind the `dynamodb` feature)
//! - [`LocalDevCacheBackend`]: bounded in-memory stand-in with optional disk snapshot
//! - [`LocalDevRedisBackend`]: local Redis with transparent in-memory fallback
//! - [`MultiTierCacheBackend`]: ordered composition of the above
//!
//! [`create_cache_backend`] picks one from a [`CacheConfig`]; [`PatientDataCache`] layers the
//! patient key scheme and TTL on top.

pub mod backend;
pub mod config;
pub mod constants;
pub mod dax;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod elasticache;
mod error;
pub mod facade;
pub mod factory;
pub mod key;
pub mod local_dev;
pub mod local_dev_redis;
pub mod memory;
pub mod multi_tier;
pub mod redis;

pub use backend::{BackendHealth, CacheBackend, HealthStatus};
pub use config::{CacheBackendKind, CacheConfig};
pub use dax::{CacheItem, DaxCacheBackend, ItemTable, MemoryItemTable};
#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbTable;
pub use elasticache::{ElastiCacheBackend, ElastiCacheSettings};
pub use error::{CacheError, CacheResult};
pub use facade::{LazyPatientDataCache, PatientDataCache};
pub use factory::create_cache_backend;
pub use key::{PatientCacheKey, PATIENT_KEY_NAMESPACE};
pub use local_dev::{LocalDevCacheBackend, LocalDevSettings, LocalStats, SimulatedBackend};
pub use local_dev_redis::LocalDevRedisBackend;
pub use memory::{MemoryCacheBackend, MemoryStats};
pub use multi_tier::{MultiTierCacheBackend, TierHealth, TierInfo};
pub use crate::redis::{RedisCacheBackend, RedisStore};
