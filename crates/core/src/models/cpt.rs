//! CPT procedure codes billed against the patient's encounters.

use super::de;
use super::{fill_default, raw_text, Keyed, ParseContext, RawItem, VprEntity};
use crate::{ParseError, ParseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CPT_URN_PREFIX: &str = "urn:cpt:";

fn default_quantity() -> u32 {
    1
}

/// Split a modifier list such as `"25, 59"` or `"25 59"` into codes.
pub fn parse_cpt_modifiers(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_uppercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CptCode {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub cpt_code: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "de::opt_string")]
    pub kind: Option<String>,
    #[serde(rename = "dateTime", deserialize_with = "de::datetime")]
    pub procedure_date: DateTime<Utc>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub entered: Option<DateTime<Utc>>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub encounter_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub encounter_name: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_uid: Option<String>,
}

impl CptCode {
    /// `"<code> - <name>"`, or the bare code when the name is empty.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.cpt_code.clone()
        } else {
            format!("{} - {}", self.cpt_code, self.name)
        }
    }
}

impl Keyed for CptCode {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for CptCode {
    const KIND: &'static str = "cpt";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        let uid = raw_text(item, "uid").unwrap_or_default();
        if uid.is_empty() {
            return Err(ParseError::Skipped("CPT code without uid".to_owned()));
        }

        if let Some(code) = raw_text(item, "cptCode") {
            if let Some(tail) = code.strip_prefix(CPT_URN_PREFIX) {
                item.insert("cptCode".to_owned(), Value::String(tail.to_owned()));
            }
        }
        if !item.contains_key("localId") {
            let local_id = uid.rsplit(':').next().unwrap_or(&uid).to_owned();
            item.insert("localId".to_owned(), Value::String(local_id));
        }
        if !item.contains_key("name") {
            item.insert("name".to_owned(), Value::String(String::new()));
        }

        if !item.contains_key("dateTime") {
            let fallback = ["performed", "entered"]
                .iter()
                .find_map(|key| item.get(*key).cloned());
            match fallback {
                Some(value) => {
                    item.insert("dateTime".to_owned(), value);
                }
                None => return Err(ParseError::Skipped(format!("CPT code {uid} has no date"))),
            }
        }

        fill_default(item, "facilityCode", &ctx.station);
        fill_default(item, "facilityName", &format!("Station {}", ctx.station));

        if let Some(Value::String(raw)) = item.get("modifiers") {
            let modifiers = parse_cpt_modifiers(raw).into_iter().map(Value::String).collect();
            item.insert("modifiers".to_owned(), Value::Array(modifiers));
        }
        Ok(())
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.procedure_date)
    }
}
