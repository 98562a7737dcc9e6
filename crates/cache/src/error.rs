#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("item store error: {0}")]
    ItemStore(String),
    #[error("failed to serialize cache value: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize cache value: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to read cache snapshot: {0}")]
    SnapshotRead(std::io::Error),
    #[error("failed to write cache snapshot: {0}")]
    SnapshotWrite(std::io::Error),
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("simulated failure in {0} backend")]
    SimulatedFailure(&'static str),
    #[error("backend `{0}` is not available in this build")]
    NotCompiled(&'static str),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
