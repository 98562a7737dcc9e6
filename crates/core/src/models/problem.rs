//! Problem list entries.

use super::de;
use super::{fill_facility, fill_local_id, Keyed, ParseContext, RawItem, VprEntity};
use crate::ParseResult;
use chrono::{DateTime, Utc};
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemStatus {
    Active,
    Inactive,
}

impl<'de> Deserialize<'de> for ProblemStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(D::Error::custom(format!("unknown problem status {other:?}"))),
        }
    }
}

/// Acuity as recorded on the problem list. Unrecognised values read as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemAcuity {
    Acute,
    Chronic,
    Unknown,
}

impl<'de> Deserialize<'de> for ProblemAcuity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_lowercase().as_str() {
            "acute" => Self::Acute,
            "chronic" => Self::Chronic,
            _ => Self::Unknown,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemComment {
    #[serde(deserialize_with = "de::string")]
    pub comment: String,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub entered: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub entered_by_code: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub entered_by_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(deserialize_with = "de::string")]
    pub problem_text: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub icd_code: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub icd_name: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub status_code: String,
    pub status_name: ProblemStatus,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub acuity_code: Option<String>,
    #[serde(default)]
    pub acuity_name: Option<ProblemAcuity>,
    #[serde(deserialize_with = "de::datetime")]
    pub entered: DateTime<Utc>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub onset: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::datetime")]
    pub updated: DateTime<Utc>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_uid: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub service: Option<String>,
    #[serde(default, deserialize_with = "de::opt_flag")]
    pub service_connected: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub service_connection_percent: Option<i64>,
    #[serde(default, deserialize_with = "de::flag")]
    pub removed: bool,
    #[serde(default, deserialize_with = "de::flag")]
    pub unverified: bool,
    #[serde(default)]
    pub comments: Vec<ProblemComment>,
}

impl Keyed for Problem {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for Problem {
    const KIND: &'static str = "problem";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        fill_local_id(item);
        fill_facility(item, &ctx.station);
        Ok(())
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.entered)
    }
}

impl Problem {
    pub fn is_active(&self) -> bool {
        self.status_name == ProblemStatus::Active
    }

    pub fn is_chronic(&self) -> bool {
        self.acuity_name == Some(ProblemAcuity::Chronic)
    }

    pub fn is_service_connected(&self) -> bool {
        self.service_connected == Some(true)
    }

    pub fn display_name(&self) -> String {
        let status = match self.status_name {
            ProblemStatus::Active => "ACTIVE",
            ProblemStatus::Inactive => "INACTIVE",
        };
        format!("{} ({})", self.problem_text, status)
    }
}
