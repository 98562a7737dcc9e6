//! Patient demographics.
//!
//! The demographics record is the one part of a VPR document that must parse: without it the
//! whole collection is rejected. Its nested parts (addresses, telecoms, supports, veteran
//! details, flags) are each parsed on their own and dropped with a warning when malformed.

use super::de;
use super::RawItem;
use crate::{ParseError, ParseResult};
use chrono::{Datelike, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const MASKED_SSN: &str = "***-**-****";

const HIGH_RISK_FLAG_KEYWORDS: &[&str] = &[
    "SUICIDE",
    "VIOLENCE",
    "BEHAVIORAL",
    "WANDERING",
    "FALL",
    "HIGH RISK",
];

fn postal_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let postal = de::opt_string(deserializer)?;
    Ok(match postal {
        None => "00000".to_owned(),
        Some(code) => {
            let code = code.trim();
            if !code.is_empty() && code.len() < 5 && code.bytes().all(|b| b.is_ascii_digit()) {
                format!("{code:0>5}")
            } else {
                code.to_owned()
            }
        }
    })
}

fn default_postal_code() -> String {
    "00000".to_owned()
}

fn default_country() -> Option<String> {
    Some("USA".to_owned())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientAddress {
    #[serde(deserialize_with = "de::string")]
    pub street_line1: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub street_line2: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub city: String,
    #[serde(deserialize_with = "de::string")]
    pub state_province: String,
    #[serde(default = "default_postal_code", deserialize_with = "postal_code")]
    pub postal_code: String,
    #[serde(default = "default_country", deserialize_with = "de::opt_string")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientTelecom {
    #[serde(deserialize_with = "de::string")]
    pub telecom: String,
    #[serde(deserialize_with = "de::string")]
    pub usage_code: String,
    #[serde(deserialize_with = "de::string")]
    pub usage_name: String,
}

impl PatientTelecom {
    pub fn is_phone(&self) -> bool {
        matches!(self.usage_code.as_str(), "HP" | "WP" | "MC" | "CP")
    }

    pub fn is_email(&self) -> bool {
        self.telecom.contains('@')
    }

    pub fn display_type(&self) -> &str {
        match self.usage_code.as_str() {
            "HP" => "Home",
            "WP" => "Work",
            "MC" => "Mobile",
            "CP" => "Cell",
            "EM" => "Email",
            _ => &self.usage_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSupport {
    /// Contact type with any URN prefix removed, e.g. `NOK`.
    #[serde(deserialize_with = "de::urn_tail")]
    pub contact_type_code: String,
    #[serde(deserialize_with = "de::string")]
    pub contact_type_name: String,
    #[serde(deserialize_with = "de::string")]
    pub name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub relationship: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VeteranInfo {
    #[serde(rename = "isVet", deserialize_with = "de::flag")]
    pub is_veteran: bool,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub lrdfn: Option<i64>,
    #[serde(default, deserialize_with = "de::flag")]
    pub service_connected: bool,
    #[serde(default, deserialize_with = "de::percent")]
    pub service_connection_percent: u8,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub service_period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientFlag {
    #[serde(deserialize_with = "de::string")]
    pub name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub category: Option<String>,
}

impl PatientFlag {
    pub fn is_high_risk(&self) -> bool {
        let name = self.name.to_uppercase();
        HIGH_RISK_FLAG_KEYWORDS
            .iter()
            .any(|keyword| name.contains(keyword))
    }
}

fn default_language_code() -> Option<String> {
    Some("EN".to_owned())
}

fn default_language_name() -> Option<String> {
    Some("ENGLISH".to_owned())
}

fn masked_ssn() -> String {
    MASKED_SSN.to_owned()
}

/// Format a raw SSN as `xxx-xx-xxxx`. Masked values pass through and empty values are masked.
pub fn format_ssn(raw: &str) -> String {
    let ssn = raw.trim();
    if ssn.is_empty() {
        return masked_ssn();
    }
    if ssn.contains("***") {
        return ssn.to_owned();
    }
    if ssn.len() == 9 && ssn.bytes().all(|b| b.is_ascii_digit()) {
        return format!("{}-{}-{}", &ssn[..3], &ssn[3..5], &ssn[5..]);
    }
    ssn.to_owned()
}

fn ssn<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(format_ssn(&de::opt_string(deserializer)?.unwrap_or_default()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDemographics {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub dfn: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub icn: Option<String>,
    #[serde(default = "masked_ssn", deserialize_with = "ssn")]
    pub ssn: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub brief_id: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub full_name: String,
    #[serde(deserialize_with = "de::string")]
    pub family_name: String,
    #[serde(deserialize_with = "de::string")]
    pub given_names: String,
    #[serde(deserialize_with = "de::date")]
    pub date_of_birth: NaiveDate,
    #[serde(default, deserialize_with = "de::opt_u32")]
    pub age: Option<u32>,
    #[serde(deserialize_with = "de::urn_tail")]
    pub gender_code: String,
    #[serde(deserialize_with = "de::string")]
    pub gender_name: String,
    #[serde(default)]
    pub addresses: Vec<PatientAddress>,
    #[serde(default)]
    pub telecoms: Vec<PatientTelecom>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub marital_status_code: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub marital_status_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub religion_code: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub religion_name: Option<String>,
    #[serde(default)]
    pub races: Vec<String>,
    #[serde(default)]
    pub ethnicities: Vec<String>,
    #[serde(default = "default_language_code", deserialize_with = "de::opt_string")]
    pub language_code: Option<String>,
    #[serde(default = "default_language_name", deserialize_with = "de::opt_string")]
    pub language_name: Option<String>,
    #[serde(default)]
    pub supports: Vec<PatientSupport>,
    #[serde(default)]
    pub veteran: Option<VeteranInfo>,
    #[serde(default, deserialize_with = "de::flag")]
    pub sensitive: bool,
    #[serde(default)]
    pub flags: Vec<PatientFlag>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub eligibility_status: Option<String>,
    #[serde(rename = "pcTeamName", default, deserialize_with = "de::opt_string")]
    pub primary_team: Option<String>,
}

/// Parse each element of `raw[key]`, logging and skipping the ones that fail.
fn parse_parts<T: DeserializeOwned>(raw: &mut RawItem, key: &str) -> Vec<T> {
    let Some(Value::Array(elements)) = raw.remove(key) else {
        return Vec::new();
    };
    elements
        .into_iter()
        .filter_map(|element| match serde_json::from_value(element) {
            Ok(part) => Some(part),
            Err(e) => {
                tracing::warn!("skipping malformed patient {}: {}", key, e);
                None
            }
        })
        .collect()
}

/// Flatten `[{"race": "WHITE"}, "ASIAN"]` into `["WHITE", "ASIAN"]`.
fn flatten_named(raw: &mut RawItem, key: &str, field: &str) {
    let Some(Value::Array(entries)) = raw.get(key) else {
        return;
    };
    let flattened: Vec<Value> = entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(obj) => obj
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_owned())),
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        })
        .collect();
    raw.insert(key.to_owned(), Value::Array(flattened));
}

fn lift_marital_status(raw: &mut RawItem) {
    let first = match raw.get("maritalStatuses") {
        Some(Value::Array(statuses)) => statuses.first().and_then(Value::as_object).cloned(),
        _ => None,
    };
    let Some(status) = first else {
        return;
    };
    if raw.get("maritalStatusCode").map_or(true, Value::is_null) {
        if let Some(code) = status.get("code").and_then(Value::as_str) {
            raw.insert(
                "maritalStatusCode".to_owned(),
                Value::String(de::strip_urn(code)),
            );
        }
    }
    if raw.get("maritalStatusName").map_or(true, Value::is_null) {
        if let Some(name) = status.get("name").cloned() {
            raw.insert("maritalStatusName".to_owned(), name);
        }
    }
}

impl PatientDemographics {
    /// Build demographics from a raw `patient` item.
    ///
    /// # Errors
    /// [`ParseError::Demographics`] when the core record (names, date of birth, gender) cannot
    /// be built. Malformed nested parts never cause an error.
    pub fn from_patient_item(item: &Value, dfn: &str) -> ParseResult<Self> {
        let Value::Object(raw) = item else {
            return Err(ParseError::NotAnObject { kind: "patient" });
        };
        let mut raw = raw.clone();

        let addresses: Vec<PatientAddress> = parse_parts(&mut raw, "addresses");
        let telecoms: Vec<PatientTelecom> = parse_parts(&mut raw, "telecoms");
        let supports: Vec<PatientSupport> = parse_parts(&mut raw, "supports");
        let flags: Vec<PatientFlag> = parse_parts(&mut raw, "flags");
        let veteran = match raw.remove("veteran") {
            Some(Value::Null) | None => None,
            Some(value) => match serde_json::from_value::<VeteranInfo>(value) {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!("skipping malformed patient veteran info: {}", e);
                    None
                }
            },
        };

        lift_marital_status(&mut raw);
        flatten_named(&mut raw, "races", "race");
        flatten_named(&mut raw, "ethnicities", "ethnicity");
        raw.insert("dfn".to_owned(), Value::String(dfn.to_owned()));

        let mut demographics: Self =
            serde_json::from_value(Value::Object(raw)).map_err(ParseError::Demographics)?;
        demographics.addresses = addresses;
        demographics.telecoms = telecoms;
        demographics.supports = supports;
        demographics.flags = flags;
        demographics.veteran = veteran;
        Ok(demographics)
    }

    /// Home phone if recorded, otherwise the first phone of any kind.
    pub fn primary_phone(&self) -> Option<&str> {
        self.telecoms
            .iter()
            .find(|t| t.usage_code == "HP")
            .or_else(|| self.telecoms.iter().find(|t| t.is_phone()))
            .map(|t| t.telecom.as_str())
    }

    pub fn mobile_phone(&self) -> Option<&str> {
        self.telecoms
            .iter()
            .find(|t| matches!(t.usage_code.as_str(), "MC" | "CP"))
            .map(|t| t.telecom.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.telecoms
            .iter()
            .find(|t| t.is_email())
            .map(|t| t.telecom.as_str())
    }

    pub fn primary_address(&self) -> Option<&PatientAddress> {
        self.addresses.first()
    }

    /// Emergency contact if one is listed, otherwise next of kin.
    pub fn emergency_contact(&self) -> Option<&PatientSupport> {
        self.supports
            .iter()
            .find(|s| matches!(s.contact_type_code.as_str(), "ECON" | "EC"))
            .or_else(|| self.supports.iter().find(|s| s.contact_type_code == "NOK"))
    }

    pub fn has_high_risk_flags(&self) -> bool {
        self.flags.iter().any(PatientFlag::is_high_risk)
    }

    /// Age in whole years on `as_of`.
    pub fn calculate_age(&self, as_of: NaiveDate) -> i32 {
        let dob = self.date_of_birth;
        let mut age = as_of.year() - dob.year();
        if (as_of.month(), as_of.day()) < (dob.month(), dob.day()) {
            age -= 1;
        }
        age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient_item() -> Value {
        json!({
            "uid": "urn:va:patient:500:237:237",
            "icn": 10108,
            "ssn": "666000237",
            "briefId": "A0237",
            "fullName": "ANDERSON,JAMES",
            "familyName": "ANDERSON",
            "givenNames": "JAMES",
            "dateOfBirth": 19500315,
            "genderCode": "urn:va:gender:M",
            "genderName": "Male",
            "maritalStatuses": [{"code": "urn:va:pat-maritalStatus:M", "name": "Married"}],
            "races": [{"race": "WHITE"}],
            "ethnicities": [{"ethnicity": "NOT HISPANIC OR LATINO"}],
            "pcTeamName": "GREEN TEAM",
            "addresses": [
                {"streetLine1": "1 MAIN ST", "city": "ANYTOWN", "stateProvince": "NY", "postalCode": 1234},
                {"city": "NOWHERE"}
            ],
            "telecoms": [
                {"telecom": "555-0100", "usageCode": "WP", "usageName": "work"},
                {"telecom": "555-0199", "usageCode": "HP", "usageName": "home"},
                {"telecom": "jim@example.org", "usageCode": "EM", "usageName": "email"}
            ],
            "supports": [
                {"contactTypeCode": "urn:va:pat-contact:NOK", "contactTypeName": "Next of Kin", "name": "ANDERSON,MARY"}
            ],
            "veteran": {"isVet": 1, "serviceConnected": true, "serviceConnectionPercent": 140},
            "flags": [{"name": "HIGH RISK FOR SUICIDE"}]
        })
    }

    #[test]
    fn test_builds_record_and_derived_fields() {
        let demo = PatientDemographics::from_patient_item(&patient_item(), "237").expect("demo");
        assert_eq!(demo.dfn.as_deref(), Some("237"));
        assert_eq!(demo.icn.as_deref(), Some("10108"));
        assert_eq!(demo.ssn, "666-00-0237");
        assert_eq!(demo.gender_code, "M");
        assert_eq!(demo.marital_status_code.as_deref(), Some("M"));
        assert_eq!(demo.marital_status_name.as_deref(), Some("Married"));
        assert_eq!(demo.races, vec!["WHITE".to_owned()]);
        assert_eq!(demo.primary_team.as_deref(), Some("GREEN TEAM"));
        assert_eq!(demo.language_code.as_deref(), Some("EN"));
    }

    #[test]
    fn test_malformed_parts_are_dropped() {
        let demo = PatientDemographics::from_patient_item(&patient_item(), "237").expect("demo");
        assert_eq!(demo.addresses.len(), 1);
        assert_eq!(demo.addresses[0].postal_code, "01234");
        assert_eq!(demo.addresses[0].country.as_deref(), Some("USA"));
    }

    #[test]
    fn test_contact_helpers() {
        let demo = PatientDemographics::from_patient_item(&patient_item(), "237").expect("demo");
        assert_eq!(demo.primary_phone(), Some("555-0199"));
        assert_eq!(demo.email(), Some("jim@example.org"));
        assert_eq!(demo.mobile_phone(), None);
        let contact = demo.emergency_contact().expect("nok");
        assert_eq!(contact.contact_type_code, "NOK");
        assert!(demo.has_high_risk_flags());
        let veteran = demo.veteran.as_ref().expect("veteran");
        assert!(veteran.is_veteran);
        assert_eq!(veteran.service_connection_percent, 100);
    }

    #[test]
    fn test_missing_core_fields_fail() {
        let mut item = patient_item();
        item.as_object_mut().expect("object").remove("dateOfBirth");
        assert!(matches!(
            PatientDemographics::from_patient_item(&item, "237"),
            Err(ParseError::Demographics(_))
        ));
    }

    #[test]
    fn test_calculate_age() {
        let demo = PatientDemographics::from_patient_item(&patient_item(), "237").expect("demo");
        let before_birthday = NaiveDate::from_ymd_opt(2024, 3, 14).expect("date");
        let on_birthday = NaiveDate::from_ymd_opt(2024, 3, 15).expect("date");
        assert_eq!(demo.calculate_age(before_birthday), 73);
        assert_eq!(demo.calculate_age(on_birthday), 74);
    }

    #[test]
    fn test_format_ssn() {
        assert_eq!(format_ssn(""), "***-**-****");
        assert_eq!(format_ssn("123456789"), "123-45-6789");
        assert_eq!(format_ssn("***-**-6789"), "***-**-6789");
        assert_eq!(format_ssn("12345"), "12345");
    }

    #[test]
    fn test_round_trips_through_json() {
        let demo = PatientDemographics::from_patient_item(&patient_item(), "237").expect("demo");
        let value = serde_json::to_value(&demo).expect("serialize");
        let back: PatientDemographics = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, demo);
    }
}
