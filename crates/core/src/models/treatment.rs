//! Treatments and procedures.

use super::de;
use super::{fill_from, Keyed, ParseContext, RawItem, VprEntity};
use crate::ParseResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TreatmentStatus {
    Completed,
    InProgress,
    #[default]
    Pending,
    Scheduled,
    Discontinued,
    Expired,
    Lapsed,
    EditedDiscontinued,
}

impl TreatmentStatus {
    /// Map a VistA status onto the treatment vocabulary. Unknown values are pending.
    ///
    /// The serialized forms are accepted as well, so a cached treatment reads back unchanged.
    pub fn from_external(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "COMPLETED" | "COMPLETE" => Self::Completed,
            "IN_PROGRESS" | "IN-PROGRESS" | "ACTIVE" => Self::InProgress,
            "SCHEDULED" => Self::Scheduled,
            "DISCONTINUED" => Self::Discontinued,
            "DISCONTINUED/EDIT" | "EDITED-DISCONTINUED" => Self::EditedDiscontinued,
            "EXPIRED" => Self::Expired,
            "LAPSED" => Self::Lapsed,
            _ => Self::Pending,
        }
    }
}

impl<'de> Deserialize<'de> for TreatmentStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map_or(Self::Pending, Self::from_external))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Treatment {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub dfn: String,
    #[serde(deserialize_with = "de::string")]
    pub name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub treatment_type: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub category: Option<String>,
    #[serde(deserialize_with = "de::datetime")]
    pub date: DateTime<Utc>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub entered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TreatmentStatus,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub outcome: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub related_order_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub related_visit_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub facility_code: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub facility_name: Option<String>,
}

impl Keyed for Treatment {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for Treatment {
    const KIND: &'static str = "treatment";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        item.insert("dfn".to_owned(), Value::String(ctx.dfn.clone()));
        fill_from(item, "date", &["dateTime", "entered"], None);
        fill_from(item, "status", &["statusName"], None);
        Ok(())
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }
}

impl Treatment {
    pub fn is_active(&self) -> bool {
        self.status == TreatmentStatus::InProgress
    }

    pub fn is_completed(&self) -> bool {
        self.status == TreatmentStatus::Completed
    }

    pub fn is_discontinued(&self) -> bool {
        matches!(
            self.status,
            TreatmentStatus::Discontinued | TreatmentStatus::EditedDiscontinued
        )
    }

    pub fn display_name(&self) -> String {
        match &self.treatment_type {
            Some(kind) if !kind.is_empty() => format!("{} ({})", self.name, kind),
            _ => self.name.clone(),
        }
    }
}
