//! Cache configuration.
//!
//! Resolved once at process startup and handed to [`crate::create_cache_backend`]. Nothing in
//! this crate reads environment variables after construction.

use crate::constants::{
    DEFAULT_AWS_REGION, DEFAULT_DAX_TABLE_NAME, DEFAULT_ELASTICACHE_PORT, DEFAULT_KEY_PREFIX,
    DEFAULT_LOCAL_DEV_MAX_SIZE, DEFAULT_LOCAL_DEV_PERSISTENCE_FILE, DEFAULT_LOCAL_DEV_REDIS_URL,
    DEFAULT_PATIENT_CACHE_TTL_MINUTES, DEFAULT_REDIS_URL,
};
use crate::local_dev::{LocalDevSettings, SimulatedBackend};
use crate::{CacheError, CacheResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheBackendKind {
    Memory,
    Redis,
    ElastiCache,
    Dax,
    MultiTier,
    LocalDev,
    LocalDevRedis,
}

impl CacheBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheBackendKind::Memory => "memory",
            CacheBackendKind::Redis => "redis",
            CacheBackendKind::ElastiCache => "elasticache",
            CacheBackendKind::Dax => "dax",
            CacheBackendKind::MultiTier => "multi-tier",
            CacheBackendKind::LocalDev => "local-dev",
            CacheBackendKind::LocalDevRedis => "local-dev-redis",
        }
    }
}

impl std::fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheBackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackendKind::Memory),
            "redis" => Ok(CacheBackendKind::Redis),
            "elasticache" => Ok(CacheBackendKind::ElastiCache),
            "dax" => Ok(CacheBackendKind::Dax),
            "multi-tier" => Ok(CacheBackendKind::MultiTier),
            "local-dev" => Ok(CacheBackendKind::LocalDev),
            "local-dev-redis" => Ok(CacheBackendKind::LocalDevRedis),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown cache backend `{other}`"
            ))),
        }
    }
}

/// Everything needed to build a cache backend and the patient data facade.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub key_prefix: String,
    /// TTL the facade stores patient data with.
    pub patient_ttl: Duration,
    pub redis_url: String,
    pub elasticache_endpoint: Option<String>,
    pub elasticache_port: u16,
    pub elasticache_auth_token: Option<String>,
    pub aws_region: String,
    pub dax_endpoint: Option<String>,
    pub dax_table_name: String,
    /// Ordered tier list, fastest first.
    pub multi_tier_backends: Vec<CacheBackendKind>,
    pub write_through: bool,
    pub read_through: bool,
    pub local_dev_backend_type: SimulatedBackend,
    pub local_dev_max_size: usize,
    pub local_dev_persistence_file: Option<PathBuf>,
    pub local_dev_redis_url: String,
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("backend", &self.backend)
            .field("key_prefix", &self.key_prefix)
            .field("patient_ttl", &self.patient_ttl)
            .field("elasticache_endpoint", &self.elasticache_endpoint)
            .field("aws_region", &self.aws_region)
            .field("dax_table_name", &self.dax_table_name)
            .field("multi_tier_backends", &self.multi_tier_backends)
            .field("write_through", &self.write_through)
            .field("read_through", &self.read_through)
            .finish_non_exhaustive()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            patient_ttl: Duration::from_secs(DEFAULT_PATIENT_CACHE_TTL_MINUTES * 60),
            redis_url: DEFAULT_REDIS_URL.to_owned(),
            elasticache_endpoint: None,
            elasticache_port: DEFAULT_ELASTICACHE_PORT,
            elasticache_auth_token: None,
            aws_region: DEFAULT_AWS_REGION.to_owned(),
            dax_endpoint: None,
            dax_table_name: DEFAULT_DAX_TABLE_NAME.to_owned(),
            multi_tier_backends: vec![CacheBackendKind::Memory, CacheBackendKind::Redis],
            write_through: true,
            read_through: true,
            local_dev_backend_type: SimulatedBackend::default(),
            local_dev_max_size: DEFAULT_LOCAL_DEV_MAX_SIZE,
            local_dev_persistence_file: None,
            local_dev_redis_url: DEFAULT_LOCAL_DEV_REDIS_URL.to_owned(),
        }
    }
}

fn parse_bool(name: &str, raw: &str) -> CacheResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CacheError::InvalidConfig(format!(
            "{name} must be true or false, got `{other}`"
        ))),
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> CacheResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| CacheError::InvalidConfig(format!("{name} must be a number, got `{raw}`")))
}

impl CacheConfig {
    /// Build a config from a variable lookup. Unset or blank variables take their defaults.
    ///
    /// # Arguments
    /// * `lookup` - returns the value of a named variable, if set.
    ///
    /// # Errors
    /// [`CacheError::InvalidConfig`] for an unknown backend name, a malformed number or flag, or
    /// an empty tier list.
    pub fn from_lookup<F>(lookup: F) -> CacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("CACHE_BACKEND") {
            cfg.backend = v.parse()?;
        }
        if let Some(v) = get("CACHE_KEY_PREFIX") {
            cfg.key_prefix = v;
        }
        if let Some(v) = get("PATIENT_CACHE_TTL_MINUTES") {
            let minutes: u64 = parse_number("PATIENT_CACHE_TTL_MINUTES", &v)?;
            cfg.patient_ttl = Duration::from_secs(minutes * 60);
        }
        if let Some(v) = get("REDIS_URL") {
            cfg.redis_url = v;
        }
        cfg.elasticache_endpoint = get("ELASTICACHE_ENDPOINT");
        if let Some(v) = get("ELASTICACHE_PORT") {
            cfg.elasticache_port = parse_number("ELASTICACHE_PORT", &v)?;
        }
        cfg.elasticache_auth_token = get("ELASTICACHE_AUTH_TOKEN");
        if let Some(v) = get("AWS_REGION") {
            cfg.aws_region = v;
        }
        cfg.dax_endpoint = get("DAX_ENDPOINT");
        if let Some(v) = get("DAX_TABLE_NAME") {
            cfg.dax_table_name = v;
        }
        if let Some(v) = lookup("MULTI_TIER_BACKENDS") {
            cfg.multi_tier_backends = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect::<CacheResult<_>>()?;
            if cfg.multi_tier_backends.is_empty() {
                return Err(CacheError::InvalidConfig(
                    "MULTI_TIER_BACKENDS must name at least one backend".into(),
                ));
            }
        }
        if let Some(v) = get("MULTI_TIER_WRITE_THROUGH") {
            cfg.write_through = parse_bool("MULTI_TIER_WRITE_THROUGH", &v)?;
        }
        if let Some(v) = get("MULTI_TIER_READ_THROUGH") {
            cfg.read_through = parse_bool("MULTI_TIER_READ_THROUGH", &v)?;
        }
        if let Some(v) = get("LOCAL_DEV_BACKEND_TYPE") {
            cfg.local_dev_backend_type = v.parse()?;
        }
        if let Some(v) = get("LOCAL_DEV_MAX_SIZE") {
            cfg.local_dev_max_size = parse_number("LOCAL_DEV_MAX_SIZE", &v)?;
        }
        let persistence = match get("LOCAL_DEV_PERSISTENCE") {
            Some(v) => parse_bool("LOCAL_DEV_PERSISTENCE", &v)?,
            None => false,
        };
        if persistence {
            let file = get("LOCAL_DEV_PERSISTENCE_FILE")
                .unwrap_or_else(|| DEFAULT_LOCAL_DEV_PERSISTENCE_FILE.to_owned());
            cfg.local_dev_persistence_file = Some(PathBuf::from(file));
        }
        if let Some(v) = get("LOCAL_DEV_REDIS_URL") {
            cfg.local_dev_redis_url = v;
        }

        Ok(cfg)
    }

    /// Build a config from the process environment.
    pub fn from_env() -> CacheResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn local_dev_settings(&self) -> LocalDevSettings {
        LocalDevSettings {
            simulated: self.local_dev_backend_type,
            key_prefix: self.key_prefix.clone(),
            max_size: self.local_dev_max_size,
            persistence_file: self.local_dev_persistence_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> CacheResult<CacheConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CacheConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).expect("defaults");
        assert_eq!(cfg.backend, CacheBackendKind::Memory);
        assert_eq!(cfg.key_prefix, "mcp:");
        assert_eq!(cfg.patient_ttl, Duration::from_secs(20 * 60));
        assert_eq!(
            cfg.multi_tier_backends,
            vec![CacheBackendKind::Memory, CacheBackendKind::Redis]
        );
        assert!(cfg.write_through && cfg.read_through);
        assert_eq!(cfg.local_dev_persistence_file, None);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("CACHE_BACKEND", "Multi-Tier"),
            ("PATIENT_CACHE_TTL_MINUTES", "5"),
            ("MULTI_TIER_BACKENDS", "local-dev, elasticache"),
            ("MULTI_TIER_READ_THROUGH", "false"),
            ("LOCAL_DEV_PERSISTENCE", "true"),
            ("ELASTICACHE_PORT", "6380"),
        ])
        .expect("config");
        assert_eq!(cfg.backend, CacheBackendKind::MultiTier);
        assert_eq!(cfg.patient_ttl, Duration::from_secs(300));
        assert_eq!(
            cfg.multi_tier_backends,
            vec![CacheBackendKind::LocalDev, CacheBackendKind::ElastiCache]
        );
        assert!(!cfg.read_through);
        assert_eq!(
            cfg.local_dev_persistence_file,
            Some(PathBuf::from("local_cache.json"))
        );
        assert_eq!(cfg.elasticache_port, 6380);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config(&[("CACHE_BACKEND", "memcached")]).is_err());
        assert!(config(&[("PATIENT_CACHE_TTL_MINUTES", "twenty")]).is_err());
        assert!(config(&[("MULTI_TIER_BACKENDS", " , ")]).is_err());
        assert!(config(&[("MULTI_TIER_WRITE_THROUGH", "maybe")]).is_err());
    }

    #[test]
    fn test_debug_omits_secrets() {
        let cfg = config(&[("ELASTICACHE_AUTH_TOKEN", "hunter2")]).expect("config");
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
