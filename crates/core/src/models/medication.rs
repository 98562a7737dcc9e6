//! Outpatient and inpatient medications.

use super::de;
use super::{fill_default, fill_facility, fill_from, fill_local_id, Keyed, ParseContext, RawItem, VprEntity};
use crate::constants::REFILL_WARNING_DAYS;
use crate::mappings::{
    extract_frequency_from_sig, extract_route, extract_special_instructions, extract_timing,
    normalize_frequency, validate_status, StatusDomain,
};
use crate::ParseResult;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static STRENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?(?:MG|MCG|ML|GM|UNITS?)(?:/\d+(?:ML|TAB)?)?)")
        .expect("invalid strength pattern")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(rename = "productFormName", deserialize_with = "de::string")]
    pub medication_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub generic_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub brand_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub strength: Option<String>,
    #[serde(rename = "dosageForm", deserialize_with = "de::string")]
    pub dosage: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub sig: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub frequency: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub route: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub timing: Option<String>,
    #[serde(default)]
    pub special_instructions: Vec<String>,
    #[serde(rename = "overallStart", default, deserialize_with = "de::opt_datetime")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(rename = "overallStop", default, deserialize_with = "de::opt_datetime")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub last_filled: Option<DateTime<Utc>>,
    #[serde(rename = "vaStatus", deserialize_with = "de::string")]
    pub status: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub quantity: Option<String>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub days_supply: Option<i64>,
    #[serde(rename = "fillsRemaining", default, deserialize_with = "de::opt_i64")]
    pub refills_remaining: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub prescriber: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub prescriber_uid: Option<String>,
    #[serde(rename = "pharmacyId", default, deserialize_with = "de::opt_string")]
    pub pharmacy: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub va_class: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub therapeutic_class: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub patient_instructions: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_instructions: Option<String>,
}

impl Keyed for Medication {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for Medication {
    const KIND: &'static str = "med";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        fill_local_id(item);
        fill_facility(item, &ctx.station);

        let first_order = match item.get("orders") {
            Some(Value::Array(orders)) => orders.first().and_then(Value::as_object).cloned(),
            _ => None,
        };
        if let Some(order) = first_order {
            for (from, to) in [("providerName", "prescriber"), ("providerUid", "prescriberUid")] {
                if let Some(value) = order.get(from).filter(|v| !v.is_null()) {
                    item.entry(to.to_owned()).or_insert_with(|| value.clone());
                }
            }
        }

        if let Some(Value::Array(lines)) = item.get("sig") {
            let joined = lines
                .iter()
                .filter_map(|line| match line {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>()
                .join(" ");
            item.insert("sig".to_owned(), Value::String(joined));
        }

        fill_from(
            item,
            "productFormName",
            &["name", "medicationName", "drugName"],
            Some("UNKNOWN MEDICATION"),
        );
        fill_default(item, "dosageForm", "UNKNOWN");
        fill_default(item, "vaStatus", "ACTIVE");
        fill_from(
            item,
            "overallStart",
            &["start", "startDate", "prescribedDate", "entered"],
            Some(&ctx.today),
        );
        Ok(())
    }

    fn finalize(&mut self) {
        self.status = validate_status(&self.status, StatusDomain::Medication).to_owned();

        if self.strength.is_none() {
            self.strength = STRENGTH
                .captures(&self.medication_name.to_uppercase())
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_owned());
        }
        if self.sig.is_empty() {
            return;
        }
        if self.frequency.is_none() {
            self.frequency = extract_frequency_from_sig(&self.sig).map(str::to_owned);
        }
        if self.route.is_none() {
            self.route = extract_route(&self.sig).map(str::to_owned);
        }
        if self.timing.is_none() {
            self.timing = extract_timing(&self.sig).map(str::to_owned);
        }
        if self.special_instructions.is_empty() {
            self.special_instructions = extract_special_instructions(&self.sig)
                .into_iter()
                .map(str::to_owned)
                .collect();
        }
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }
}

impl Medication {
    /// Active status and no stop date in the past.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status.eq_ignore_ascii_case("ACTIVE") && self.end_date.map_or(true, |end| end >= now)
    }

    pub fn is_discontinued(&self) -> bool {
        matches!(
            self.status.to_ascii_uppercase().as_str(),
            "DISCONTINUED" | "STOPPED" | "EXPIRED"
        )
    }

    /// Product name with the strength appended when the name does not already carry it.
    pub fn display_name(&self) -> String {
        match &self.strength {
            Some(strength) if !self.medication_name.contains(strength.as_str()) => {
                format!("{} {}", self.medication_name, strength)
            }
            _ => self.medication_name.clone(),
        }
    }

    pub fn display_frequency(&self) -> String {
        match &self.frequency {
            Some(frequency) => normalize_frequency(frequency),
            None => "as directed".to_owned(),
        }
    }

    /// Days left in the current supply, floored at zero.
    pub fn days_until_refill_needed(&self, now: DateTime<Utc>) -> Option<i64> {
        let last_filled = self.last_filled?;
        let days_supply = self.days_supply.filter(|days| *days > 0)?;
        let due = last_filled + Duration::days(days_supply);
        Some((due - now).num_days().max(0))
    }

    pub fn needs_refill_soon(&self, now: DateTime<Utc>) -> bool {
        self.days_until_refill_needed(now)
            .is_some_and(|days| days <= REFILL_WARNING_DAYS)
    }
}
