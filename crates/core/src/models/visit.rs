//! Visits and encounters.

use super::de;
use super::{fill_default, fill_facility, fill_from, fill_local_id, Keyed, ParseContext, RawItem, VprEntity};
use crate::ParseResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitType {
    Inpatient,
    Outpatient,
    Emergency,
    Observation,
    Surgery,
    Consultation,
    #[default]
    Unknown,
}

impl<'de> Deserialize<'de> for VisitType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(match raw.trim().to_lowercase().as_str() {
            "inpatient" => Self::Inpatient,
            "outpatient" => Self::Outpatient,
            "emergency" => Self::Emergency,
            "observation" => Self::Observation,
            "surgery" => Self::Surgery,
            "consultation" => Self::Consultation,
            _ => Self::Unknown,
        })
    }
}

// Checked in order; the first rule with a matching term wins.
const LOCATION_RULES: &[(VisitType, &[&str])] = &[
    (
        VisitType::Surgery,
        &["OPERATING ROOM", "SURGERY SUITE", "PREOP", "POSTOP"],
    ),
    (VisitType::Observation, &["OBSERVATION", "OBS", "SHORT STAY"]),
    (
        VisitType::Emergency,
        &["EMERGENCY ROOM", "ER", "URGENT CARE", "TRAUMA CENTER"],
    ),
    (
        VisitType::Inpatient,
        &["WARD", "UNIT", "FLOOR", "ICU", "CCU", "STEPDOWN"],
    ),
    (VisitType::Outpatient, &["CLINIC", "AMBULATORY", "OUTPATIENT"]),
];

/// Multi-word terms match as substrings, single words only as whole words.
fn mentions(location: &str, term: &str) -> bool {
    if term.contains(' ') {
        return location.contains(term);
    }
    location
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == term)
}

impl VisitType {
    /// Classify a visit from its location. Locations matching no rule are outpatient.
    pub fn from_location(location_code: &str, location_name: &str) -> Self {
        if location_code.trim().is_empty() || location_name.trim().is_empty() {
            return Self::Unknown;
        }
        let name = location_name.to_uppercase();
        LOCATION_RULES
            .iter()
            .find(|(_, terms)| terms.iter().any(|term| mentions(&name, term)))
            .map_or(Self::Outpatient, |(visit_type, _)| *visit_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub visit_date: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::string")]
    pub location_code: String,
    #[serde(deserialize_with = "de::string")]
    pub location_name: String,
    #[serde(default)]
    pub visit_type: VisitType,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub attending_provider: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub chief_complaint: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub diagnosis: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub discharge_diagnosis: Option<String>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub admission_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub discharge_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::string")]
    pub status_code: String,
    #[serde(deserialize_with = "de::string")]
    pub status_name: String,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub ward: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub room: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub bed: Option<String>,
    #[serde(default)]
    pub order_uids: Vec<String>,
    #[serde(default)]
    pub treatment_uids: Vec<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub visit_number: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub encounter_type: Option<String>,
}

impl Keyed for Visit {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for Visit {
    const KIND: &'static str = "visit";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        fill_from(
            item,
            "visitDate",
            &["admissionDate", "scheduledDate", "dateTime"],
            None,
        );
        fill_default(item, "statusCode", "ACTIVE");
        fill_default(item, "statusName", "ACTIVE");
        fill_from(item, "locationCode", &["locationId"], Some("UNKNOWN"));
        fill_from(item, "locationName", &["location"], Some("UNKNOWN LOCATION"));
        fill_from(item, "providerName", &["attendingProvider"], None);
        fill_facility(item, &ctx.station);
        fill_local_id(item);
        Ok(())
    }

    fn finalize(&mut self) {
        if self.visit_type == VisitType::Unknown {
            self.visit_type = VisitType::from_location(&self.location_code, &self.location_name);
        }
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        self.visit_date
    }
}

impl Visit {
    pub fn is_inpatient(&self) -> bool {
        self.visit_type == VisitType::Inpatient
    }

    pub fn is_emergency(&self) -> bool {
        self.visit_type == VisitType::Emergency
    }

    /// Admitted as an inpatient and not yet discharged.
    pub fn is_active(&self) -> bool {
        self.is_inpatient() && self.admission_date.is_some() && self.discharge_date.is_none()
    }

    /// Whole days from admission to discharge, or to `now` while still admitted.
    pub fn duration_days(&self, now: DateTime<Utc>) -> Option<i64> {
        let admitted = self.admission_date?;
        Some((self.discharge_date.unwrap_or(now) - admitted).num_days())
    }

    pub fn display_location(&self) -> String {
        match (&self.ward, &self.room) {
            (Some(ward), Some(room)) => format!("{} - {} Room {}", self.location_name, ward, room),
            (Some(ward), None) => format!("{} - {}", self.location_name, ward),
            _ => self.location_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ctx() -> ParseContext {
        ParseContext::new("500", "237")
    }

    #[test]
    fn test_location_classification_order() {
        assert_eq!(
            VisitType::from_location("1", "MAIN OPERATING ROOM"),
            VisitType::Surgery
        );
        assert_eq!(
            VisitType::from_location("2", "ER OBS UNIT"),
            VisitType::Observation
        );
        assert_eq!(VisitType::from_location("3", "ER"), VisitType::Emergency);
        assert_eq!(VisitType::from_location("4", "7A MED WARD"), VisitType::Inpatient);
        assert_eq!(
            VisitType::from_location("5", "GENERAL MEDICINE"),
            VisitType::Outpatient
        );
        assert_eq!(VisitType::from_location("", "ER"), VisitType::Unknown);
    }

    #[test]
    fn test_preprocess_fallbacks() {
        let visit = Visit::from_item(
            &json!({
                "uid": "urn:va:visit:500:237:2001",
                "admissionDate": "20240110",
                "location": "3 NORTH WARD",
                "attendingProvider": "PROVIDER,TWO",
                "ward": "3N",
                "room": "12"
            }),
            &ctx(),
        )
        .expect("visit");
        assert_eq!(
            visit.visit_date,
            Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).single()
        );
        assert_eq!(visit.location_code, "UNKNOWN");
        assert_eq!(visit.location_name, "3 NORTH WARD");
        assert_eq!(visit.provider_name.as_deref(), Some("PROVIDER,TWO"));
        assert_eq!(visit.status_name, "ACTIVE");
        assert_eq!(visit.facility_code, "500");
        assert_eq!(visit.visit_type, VisitType::Inpatient);
        assert!(visit.is_active());
        assert_eq!(visit.display_location(), "3 NORTH WARD - 3N Room 12");

        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).single().expect("date");
        assert_eq!(visit.duration_days(now), Some(5));
    }

    #[test]
    fn test_explicit_visit_type_is_kept() {
        let visit = Visit::from_item(
            &json!({
                "uid": "urn:va:visit:500:237:2002",
                "dateTime": "20240110",
                "locationName": "CARDIOLOGY CLINIC",
                "visitType": "Consultation"
            }),
            &ctx(),
        )
        .expect("visit");
        assert_eq!(visit.visit_type, VisitType::Consultation);
        assert!(!visit.is_active());
    }
}
