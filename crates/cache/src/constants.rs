//! Defaults used by the cache backends and their configuration.

use std::time::Duration;

/// Default TTL of the in-process backend.
pub const MEMORY_DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default TTL of the single-node key-value backend.
pub const REDIS_DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default TTL of the clustered key-value backend.
pub const ELASTICACHE_DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Default TTL of the accelerated-table backend.
pub const DAX_DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default TTL of the in-memory local development backend.
pub const LOCAL_DEV_DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Default TTL of the local development backend that prefers a real key-value store.
pub const LOCAL_DEV_REDIS_DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Default TTL applied by the patient data facade.
pub const DEFAULT_PATIENT_CACHE_TTL_MINUTES: u64 = 20;

/// Prefix prepended to every key written by a deployment.
pub const DEFAULT_KEY_PREFIX: &str = "mcp:";

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";

pub const DEFAULT_LOCAL_DEV_REDIS_URL: &str = "redis://:local_dev_password@localhost:6379/0";

pub const DEFAULT_ELASTICACHE_PORT: u16 = 6379;

pub const DEFAULT_AWS_REGION: &str = "us-east-1";

pub const DEFAULT_DAX_TABLE_NAME: &str = "vista_cache";

pub const DEFAULT_LOCAL_DEV_MAX_SIZE: usize = 1000;

pub const DEFAULT_LOCAL_DEV_PERSISTENCE_FILE: &str = "local_cache.json";

/// Number of keys requested per `SCAN` round trip when clearing a prefix.
pub const SCAN_BATCH_SIZE: usize = 100;

/// Connect and command timeout used by the local development store probe.
pub const LOCAL_DEV_REDIS_TIMEOUT: Duration = Duration::from_secs(2);
