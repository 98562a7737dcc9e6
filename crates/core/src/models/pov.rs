//! Purposes of visit: the conditions an encounter addressed.

use super::de;
use super::{fill_facility, fill_local_id, Keyed, ParseContext, RawItem, VprEntity};
use crate::ParseResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PovType {
    #[serde(rename = "P")]
    Primary,
    #[serde(rename = "S")]
    Secondary,
}

impl<'de> Deserialize<'de> for PovType {
    /// `S` is secondary; anything else is primary.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(if raw.trim().eq_ignore_ascii_case("S") {
            Self::Secondary
        } else {
            Self::Primary
        })
    }
}

fn default_pov_type() -> PovType {
    PovType::Primary
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeOfVisit {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(deserialize_with = "de::string")]
    pub name: String,
    #[serde(rename = "type", default = "default_pov_type")]
    pub pov_type: PovType,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub narrative: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub icd_code: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub icd_name: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub encounter_name: String,
    #[serde(deserialize_with = "de::string")]
    pub encounter_uid: String,
    #[serde(deserialize_with = "de::datetime")]
    pub entered: DateTime<Utc>,
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
}

impl Keyed for PurposeOfVisit {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for PurposeOfVisit {
    const KIND: &'static str = "pov";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        fill_local_id(item);
        fill_facility(item, &ctx.station);
        Ok(())
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.entered)
    }
}

impl PurposeOfVisit {
    pub fn is_primary(&self) -> bool {
        self.pov_type == PovType::Primary
    }

    pub fn has_icd_code(&self) -> bool {
        self.icd_code.as_deref().is_some_and(|code| !code.trim().is_empty())
    }

    pub fn display_name(&self) -> String {
        let kind = if self.is_primary() { "Primary" } else { "Secondary" };
        format!("{} ({})", self.name, kind)
    }
}
