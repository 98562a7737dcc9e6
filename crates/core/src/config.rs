//! Core runtime configuration.
//!
//! Resolved once at process startup and passed into the Vista client and the caller-identity
//! resolver. Request handling never reads process-wide environment variables.

use crate::constants::{DEFAULT_DUZ, DEFAULT_STATION, DEFAULT_VISTA_TIMEOUT_SECS};
use crate::{PatientDataError, PatientDataResult};
use std::time::Duration;
use vpr_types::{CallerId, StationId};

/// Core configuration resolved at startup.
#[derive(Clone)]
pub struct CoreConfig {
    vista_base_url: Option<String>,
    vista_token: Option<String>,
    vista_timeout: Duration,
    default_station: StationId,
    default_duz: CallerId,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("vista_base_url", &self.vista_base_url)
            .field("vista_token", &self.vista_token.as_ref().map(|_| "<redacted>"))
            .field("vista_timeout", &self.vista_timeout)
            .field("default_station", &self.default_station)
            .field("default_duz", &self.default_duz)
            .finish()
    }
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        vista_base_url: Option<String>,
        vista_token: Option<String>,
        vista_timeout: Duration,
        default_station: StationId,
        default_duz: CallerId,
    ) -> PatientDataResult<Self> {
        if vista_timeout.is_zero() {
            return Err(PatientDataError::InvalidConfig(
                "VISTA_TIMEOUT_SECONDS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            vista_base_url: vista_base_url
                .map(|url| url.trim().trim_end_matches('/').to_owned())
                .filter(|url| !url.is_empty()),
            vista_token,
            vista_timeout,
            default_station,
            default_duz,
        })
    }

    /// Resolve configuration from an arbitrary variable source.
    ///
    /// # Errors
    /// [`PatientDataError::InvalidConfig`] for a malformed timeout, and
    /// [`PatientDataError::InvalidIdentifier`] for an unusable default station or DUZ.
    pub fn from_lookup<F>(lookup: F) -> PatientDataResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_secs = match lookup("VISTA_TIMEOUT_SECONDS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                PatientDataError::InvalidConfig(format!(
                    "VISTA_TIMEOUT_SECONDS must be a number, got `{raw}`"
                ))
            })?,
            None => DEFAULT_VISTA_TIMEOUT_SECS,
        };
        let station = lookup("DEFAULT_STATION").unwrap_or_else(|| DEFAULT_STATION.to_owned());
        let duz = lookup("DEFAULT_DUZ").unwrap_or_else(|| DEFAULT_DUZ.to_owned());

        Self::new(
            lookup("VISTA_API_BASE_URL"),
            lookup("VISTA_API_TOKEN").filter(|token| !token.trim().is_empty()),
            Duration::from_secs(timeout_secs),
            StationId::new(station)?,
            CallerId::new(duz)?,
        )
    }

    pub fn from_env() -> PatientDataResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn vista_base_url(&self) -> Option<&str> {
        self.vista_base_url.as_deref()
    }

    pub fn vista_token(&self) -> Option<&str> {
        self.vista_token.as_deref()
    }

    pub fn vista_timeout(&self) -> Duration {
        self.vista_timeout
    }

    pub fn default_station(&self) -> &StationId {
        &self.default_station
    }

    pub fn default_duz(&self) -> &CallerId {
        &self.default_duz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = CoreConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(cfg.vista_base_url(), None);
        assert_eq!(cfg.vista_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.default_station().as_str(), "500");
        assert_eq!(cfg.default_duz().as_str(), "10000000219");
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let cfg = CoreConfig::from_lookup(lookup(&[
            ("VISTA_API_BASE_URL", "https://vista.example.org/"),
            ("VISTA_API_TOKEN", "secret"),
            ("VISTA_TIMEOUT_SECONDS", "5"),
            ("DEFAULT_STATION", "640"),
            ("DEFAULT_DUZ", "42"),
        ]))
        .expect("config");
        assert_eq!(cfg.vista_base_url(), Some("https://vista.example.org"));
        assert_eq!(cfg.vista_token(), Some("secret"));
        assert_eq!(cfg.vista_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.default_station().as_str(), "640");
        assert!(!format!("{cfg:?}").contains("secret"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            CoreConfig::from_lookup(lookup(&[("VISTA_TIMEOUT_SECONDS", "soon")])),
            Err(PatientDataError::InvalidConfig(_))
        ));
        assert!(matches!(
            CoreConfig::from_lookup(lookup(&[("VISTA_TIMEOUT_SECONDS", "0")])),
            Err(PatientDataError::InvalidConfig(_))
        ));
        assert!(matches!(
            CoreConfig::from_lookup(lookup(&[("DEFAULT_STATION", "5:00")])),
            Err(PatientDataError::InvalidIdentifier(_))
        ));
    }
}
