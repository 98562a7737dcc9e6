//! Patient cache key derivation.
//!
//! Keys are rendered from plain string segments so the same triple produces byte-identical keys
//! in every process. Nothing here depends on hashing.

use vpr_types::{CallerId, PatientId, StationId};

/// Namespace and schema version every patient key starts with.
pub const PATIENT_KEY_NAMESPACE: &str = "patient:v1";

/// Identifies one cached patient view: a patient as seen by one caller at one station.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatientCacheKey {
    pub station: StationId,
    pub patient: PatientId,
    pub caller: CallerId,
}

impl PatientCacheKey {
    pub fn new(station: StationId, patient: PatientId, caller: CallerId) -> Self {
        Self {
            station,
            patient,
            caller,
        }
    }

    /// Render the storage key, `patient:v1:{station}:{patientId}:{callerId}`.
    pub fn render(&self) -> String {
        format!(
            "{PATIENT_KEY_NAMESPACE}:{}:{}:{}",
            self.station, self.patient, self.caller
        )
    }
}

impl std::fmt::Display for PatientCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Prepend a deployment prefix to a key.
pub(crate) fn prefixed(prefix: &str, key: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + key.len());
    out.push_str(prefix);
    out.push_str(key);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(station: &str, patient: &str, caller: &str) -> PatientCacheKey {
        PatientCacheKey::new(
            StationId::new(station).expect("station"),
            PatientId::new(patient).expect("patient"),
            CallerId::new(caller).expect("caller"),
        )
    }

    #[test]
    fn test_render_format() {
        assert_eq!(
            key("500", "237", "10000000219").render(),
            "patient:v1:500:237:10000000219"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = key("500", "1000220000V123456", "10000000219").render();
        let b = key("500", "1000220000V123456", "10000000219").render();
        assert_eq!(a.as_bytes(), b.as_bytes());
        // Fixed literal: any change to the scheme invalidates every deployed cache.
        assert_eq!(a, "patient:v1:500:1000220000V123456:10000000219");
    }

    #[test]
    fn test_distinct_callers_get_distinct_keys() {
        assert_ne!(key("500", "237", "1").render(), key("500", "237", "2").render());
    }

    #[test]
    fn test_prefixed() {
        assert_eq!(prefixed("mcp:", "patient:v1:500:1:2"), "mcp:patient:v1:500:1:2");
        assert_eq!(prefixed("", "k"), "k");
    }
}
