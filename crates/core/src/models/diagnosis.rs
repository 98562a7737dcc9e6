//! Diagnoses, built from both problem-list and purpose-of-visit items.

use super::de;
use super::{
    fill_default, fill_facility, fill_from, fill_local_id, raw_text, Keyed, ParseContext, ProblemComment,
    RawItem, VprEntity,
};
use crate::ParseResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ICD10_URN_PREFIX: &str = "urn:10d:";

/// Strip a `urn:10d:` prefix in any case.
fn strip_icd_prefix(code: &str) -> &str {
    match code.get(..ICD10_URN_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(ICD10_URN_PREFIX) => {
            &code[ICD10_URN_PREFIX.len()..]
        }
        _ => code,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(deserialize_with = "de::string")]
    pub icd_code: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub icd_version: Option<String>,
    #[serde(rename = "icdName", deserialize_with = "de::string")]
    pub description: String,
    /// `primary` or `secondary`.
    #[serde(deserialize_with = "de::string")]
    pub diagnosis_type: String,
    /// `active` or `resolved`.
    #[serde(deserialize_with = "de::string")]
    pub status: String,
    #[serde(rename = "entered", default, deserialize_with = "de::opt_datetime")]
    pub diagnosis_date: Option<DateTime<Utc>>,
    #[serde(rename = "providerName", default, deserialize_with = "de::opt_string")]
    pub provider: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_uid: Option<String>,
    #[serde(rename = "encounterUid", default, deserialize_with = "de::opt_string")]
    pub associated_visit_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub encounter_name: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default)]
    pub comments: Vec<ProblemComment>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub summary: Option<String>,
}

impl Keyed for Diagnosis {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for Diagnosis {
    const KIND: &'static str = "diagnosis";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        let code = raw_text(item, "icdCode").unwrap_or_default();
        let code = strip_icd_prefix(code.trim()).trim().to_uppercase();
        item.insert("icdCode".to_owned(), Value::String(code.clone()));

        fill_from(item, "icdName", &["name"], Some("UNKNOWN DIAGNOSIS"));
        fill_facility(item, "000");
        fill_default(item, "entered", &ctx.today);
        fill_local_id(item);

        if !code.is_empty() && !item.contains_key("icdVersion") {
            let version = if code.chars().any(char::is_alphabetic) {
                "ICD-10"
            } else {
                "ICD-9"
            };
            item.insert("icdVersion".to_owned(), Value::String(version.to_owned()));
        }

        let problem_status = raw_text(item, "problemStatus")
            .unwrap_or_default()
            .to_lowercase();
        let pov_type = raw_text(item, "type").unwrap_or_default().to_uppercase();

        if !item.contains_key("diagnosisType") {
            let diagnosis_type = if problem_status.contains("primary") || pov_type == "P" {
                "primary"
            } else {
                "secondary"
            };
            item.insert(
                "diagnosisType".to_owned(),
                Value::String(diagnosis_type.to_owned()),
            );
        }
        if !item.contains_key("status") {
            let status = match problem_status.as_str() {
                "resolved" | "inactive" => "resolved",
                _ => "active",
            };
            item.insert("status".to_owned(), Value::String(status.to_owned()));
        }
        Ok(())
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        self.diagnosis_date
    }
}

impl Diagnosis {
    pub fn is_primary(&self) -> bool {
        self.diagnosis_type == "primary"
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}
