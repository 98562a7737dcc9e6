//! Health and risk factors recorded against the patient.

use super::de;
use super::{fill_default, fill_facility, fill_local_id, raw_text, Keyed, ParseContext, RawItem, VprEntity};
use crate::{ParseError, ParseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_status() -> String {
    "active".to_owned()
}

fn default_display() -> bool {
    true
}

fn default_kind() -> String {
    "Health Factor".to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthFactor {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(rename = "name", deserialize_with = "de::string")]
    pub factor_name: String,
    #[serde(rename = "categoryName", deserialize_with = "de::string")]
    pub category: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub category_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub severity: Option<String>,
    #[serde(default = "default_status", deserialize_with = "de::string")]
    pub status: String,
    #[serde(rename = "entered", deserialize_with = "de::datetime")]
    pub recorded_date: DateTime<Utc>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub recorded_by: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub encounter_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub encounter_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_uid: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(rename = "comment", default, deserialize_with = "de::opt_string")]
    pub comments: Option<String>,
    #[serde(default = "default_display")]
    pub display: bool,
    #[serde(default = "default_kind")]
    pub kind: String,
}

impl Keyed for HealthFactor {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for HealthFactor {
    const KIND: &'static str = "factor";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        let uid = raw_text(item, "uid").unwrap_or_default();
        if uid.is_empty() {
            return Err(ParseError::Skipped("health factor without uid".to_owned()));
        }
        if raw_text(item, "invalid").as_deref() == Some("data") {
            return Err(ParseError::Skipped(format!("health factor {uid} marked invalid")));
        }

        fill_default(item, "name", "UNKNOWN HEALTH FACTOR");
        fill_default(item, "categoryName", "GENERAL");
        fill_facility(item, "000");
        fill_default(item, "entered", &ctx.today);
        fill_local_id(item);
        Ok(())
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.recorded_date)
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
    fn test_defaults_are_filled() {
        let factor = HealthFactor::from_item(
            &json!({"uid": "urn:va:factor:500:237:44", "entered": "20240105"}),
            &ctx(),
        )
        .expect("factor");
        assert_eq!(factor.factor_name, "UNKNOWN HEALTH FACTOR");
        assert_eq!(factor.category, "GENERAL");
        assert_eq!(factor.facility_code, "000");
        assert_eq!(factor.facility_name, "UNKNOWN FACILITY");
        assert_eq!(factor.local_id, "44");
        assert_eq!(factor.status, "active");
        assert!(factor.display);
        assert_eq!(
            factor.recorded_date,
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).single().expect("date")
        );
    }

    #[test]
    fn test_missing_entered_uses_today() {
        let factor = HealthFactor::from_item(
            &json!({"uid": "urn:va:factor:500:237:45", "name": "CURRENT SMOKER"}),
            &ctx(),
        )
        .expect("factor");
        assert_eq!(factor.recorded_date.date_naive(), Utc::now().date_naive());
    }

    #[test]
    fn test_invalid_items_are_skipped() {
        let no_uid = HealthFactor::from_item(&json!({"name": "X"}), &ctx());
        assert!(matches!(no_uid, Err(ParseError::Skipped(_))));

        let flagged = HealthFactor::from_item(
            &json!({"uid": "urn:va:factor:500:237:46", "invalid": "data"}),
            &ctx(),
        );
        assert!(matches!(flagged, Err(ParseError::Skipped(_))));
    }
}
