//! Vital signs, laboratory results and consults.

use super::de;
use super::{fill_facility, fill_local_id, Keyed, ParseContext, RawItem, VprEntity};
use crate::constants::CONSULT_OVERDUE_DAYS;
use crate::datetime::parse_blood_pressure;
use crate::mappings::{abnormal_flag_meaning, clean_specimen_type, validate_status, StatusDomain};
use crate::ParseResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HL7 observation interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterpretationCode {
    High,
    Low,
    CriticalHigh,
    CriticalLow,
    Abnormal,
    Normal,
}

impl InterpretationCode {
    /// Read a code such as `H` or `urn:hl7:observation-interpretation:HH`.
    pub fn from_hl7(code: &str) -> Option<Self> {
        let tail = code.rsplit(':').next().unwrap_or(code).trim().to_ascii_uppercase();
        match tail.as_str() {
            "H" => Some(Self::High),
            "L" => Some(Self::Low),
            "HH" => Some(Self::CriticalHigh),
            "LL" => Some(Self::CriticalLow),
            "A" => Some(Self::Abnormal),
            "N" => Some(Self::Normal),
            _ => None,
        }
    }

    pub fn is_critical(self) -> bool {
        matches!(self, Self::CriticalHigh | Self::CriticalLow)
    }
}

fn display_value(result: &str, units: Option<&str>) -> String {
    match units {
        Some(units) if !units.is_empty() => format!("{result} {units}"),
        _ => result.to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSign {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(deserialize_with = "de::string")]
    pub type_code: String,
    pub type_name: String,
    pub display_name: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub result: String,
    #[serde(default)]
    pub systolic: Option<u32>,
    #[serde(default)]
    pub diastolic: Option<u32>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub units: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub high: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub low: Option<String>,
    #[serde(deserialize_with = "de::datetime")]
    pub observed: DateTime<Utc>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub resulted: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub interpretation_code: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub interpretation_name: Option<String>,
}

impl Keyed for VitalSign {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for VitalSign {
    const KIND: &'static str = "vital";

    fn finalize(&mut self) {
        if self.type_name.eq_ignore_ascii_case("BLOOD PRESSURE") {
            if let Some((systolic, diastolic)) = parse_blood_pressure(&self.result) {
                self.systolic = Some(systolic);
                self.diastolic = Some(diastolic);
            }
        }
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.observed)
    }
}

impl VitalSign {
    pub fn interpretation(&self) -> Option<InterpretationCode> {
        self.interpretation_code
            .as_deref()
            .and_then(InterpretationCode::from_hl7)
    }

    pub fn is_abnormal(&self) -> bool {
        self.interpretation()
            .is_some_and(|code| code != InterpretationCode::Normal)
    }

    pub fn is_critical(&self) -> bool {
        self.interpretation().is_some_and(InterpretationCode::is_critical)
    }

    pub fn display_value(&self) -> String {
        display_value(&self.result, self.units.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabResult {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(deserialize_with = "de::string")]
    pub type_code: String,
    pub type_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub result: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub units: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub high: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub low: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub interpretation_code: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub interpretation_name: Option<String>,
    /// Meaning of the abnormal flag, e.g. `CRITICALLY HIGH`.
    #[serde(default, deserialize_with = "de::opt_string")]
    pub flag_meaning: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub group_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub group_uid: Option<String>,
    #[serde(deserialize_with = "de::datetime")]
    pub observed: DateTime<Utc>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub resulted: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub verified: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub order_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub lab_order_id: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub specimen: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub sample: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub status_code: String,
    pub status_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub comment: Option<String>,
}

impl Keyed for LabResult {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for LabResult {
    const KIND: &'static str = "lab";

    fn preprocess(item: &mut RawItem, _ctx: &ParseContext) -> ParseResult<()> {
        fill_local_id(item);
        Ok(())
    }

    fn finalize(&mut self) {
        self.specimen = self.specimen.as_deref().and_then(clean_specimen_type);
        if self.flag_meaning.is_none() {
            self.flag_meaning = self
                .interpretation_code
                .as_deref()
                .map(|code| code.rsplit(':').next().unwrap_or(code))
                .and_then(abnormal_flag_meaning)
                .map(str::to_owned);
        }
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.observed)
    }
}

impl LabResult {
    pub fn interpretation(&self) -> Option<InterpretationCode> {
        self.interpretation_code
            .as_deref()
            .and_then(InterpretationCode::from_hl7)
    }

    /// Any interpretation flag other than normal marks the result abnormal.
    pub fn is_abnormal(&self) -> bool {
        match self.interpretation() {
            Some(code) => code != InterpretationCode::Normal,
            None => self.interpretation_code.as_deref().is_some_and(|c| !c.is_empty()),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.interpretation().is_some_and(InterpretationCode::is_critical)
            || self
                .interpretation_name
                .as_deref()
                .is_some_and(|name| name.to_ascii_lowercase().contains("critical"))
    }

    pub fn display_value(&self) -> String {
        display_value(&self.result, self.units.as_deref())
    }
}

fn default_urgency() -> String {
    "Routine".to_owned()
}

fn default_consult_procedure() -> String {
    "Consult".to_owned()
}

fn default_consult_category() -> String {
    "C".to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consult {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub service: Option<String>,
    pub type_name: String,
    pub order_name: String,
    pub order_uid: String,
    pub status_name: String,
    #[serde(default = "default_urgency", deserialize_with = "de::string")]
    pub urgency: String,
    #[serde(deserialize_with = "de::datetime")]
    pub date_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provisional_dx: Option<String>,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default = "default_consult_procedure", deserialize_with = "de::string")]
    pub consult_procedure: String,
    #[serde(default = "default_consult_category", deserialize_with = "de::string")]
    pub category: String,
}

impl Keyed for Consult {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for Consult {
    const KIND: &'static str = "consult";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        fill_local_id(item);
        fill_facility(item, &ctx.station);
        // VPR nests the provisional diagnosis as {code, name}.
        if let Some(Value::Object(dx)) = item.get("provisionalDx") {
            let name = dx.get("name").or_else(|| dx.get("code")).cloned();
            item.insert("provisionalDx".to_owned(), name.unwrap_or(Value::Null));
        }
        Ok(())
    }

    fn finalize(&mut self) {
        self.status_name = validate_status(&self.status_name, StatusDomain::Consult).to_owned();
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.date_time)
    }
}

impl Consult {
    pub fn is_active(&self) -> bool {
        matches!(
            self.status_name.to_ascii_uppercase().as_str(),
            "PENDING" | "SCHEDULED" | "ACTIVE"
        )
    }

    /// Still open more than thirty days after it was ordered.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && (now - self.date_time).num_days() > CONSULT_OVERDUE_DAYS
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

    fn bp_item() -> Value {
        json!({
            "uid": "urn:va:vital:500:237:1001",
            "localId": 1001,
            "typeCode": "urn:va:vuid:4500634",
            "typeName": "BLOOD PRESSURE",
            "displayName": "BP",
            "result": "135/100",
            "units": "mm[Hg]",
            "observed": 20240119160242_u64,
            "facilityCode": 500,
            "facilityName": "CAMP MASTER",
            "interpretationCode": "urn:hl7:observation-interpretation:H"
        })
    }

    #[test]
    fn test_blood_pressure_components() {
        let vital = VitalSign::from_item(&bp_item(), &ctx()).expect("vital");
        assert_eq!(vital.systolic, Some(135));
        assert_eq!(vital.diastolic, Some(100));
        assert_eq!(vital.local_id, "1001");
        assert_eq!(vital.facility_code, "500");
        assert_eq!(vital.display_value(), "135/100 mm[Hg]");
        assert!(vital.is_abnormal());
        assert!(!vital.is_critical());
    }

    #[test]
    fn test_vital_missing_observed_is_rejected() {
        let mut item = bp_item();
        item.as_object_mut().expect("object").remove("observed");
        assert!(VitalSign::from_item(&item, &ctx()).is_err());
    }

    #[test]
    fn test_lab_specimen_and_flag() {
        let lab = LabResult::from_item(
            &json!({
                "uid": "urn:va:lab:500:237:CH;6899;1",
                "typeCode": "urn:lnc:2345-7",
                "typeName": "GLUCOSE",
                "result": 250,
                "units": "mg/dL",
                "interpretationCode": "urn:hl7:observation-interpretation:HH",
                "interpretationName": "Critical High",
                "observed": "202401191602",
                "facilityCode": "500",
                "facilityName": "CAMP MASTER",
                "specimen": "SER",
                "statusCode": "urn:va:lab-status:completed",
                "statusName": "completed"
            }),
            &ctx(),
        )
        .expect("lab");
        assert_eq!(lab.result, "250");
        assert_eq!(lab.specimen.as_deref(), Some("SERUM"));
        assert_eq!(lab.flag_meaning.as_deref(), Some("CRITICALLY HIGH"));
        assert_eq!(lab.local_id, "CH;6899;1");
        assert!(lab.is_abnormal());
        assert!(lab.is_critical());
    }

    #[test]
    fn test_consult_status_and_overdue() {
        let consult = Consult::from_item(
            &json!({
                "uid": "urn:va:consult:500:237:77",
                "localId": "77",
                "typeName": "CARDIOLOGY Cons",
                "orderName": "CARDIOLOGY",
                "orderUid": "urn:va:order:500:237:88",
                "statusName": "P",
                "dateTime": "20240101",
                "provisionalDx": {"code": "I10", "name": "Hypertension"}
            }),
            &ctx(),
        )
        .expect("consult");
        assert_eq!(consult.status_name, "PENDING");
        assert_eq!(consult.urgency, "Routine");
        assert_eq!(consult.facility_code, "500");
        assert_eq!(consult.provisional_dx.as_deref(), Some("Hypertension"));
        assert!(consult.is_active());

        let soon = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).single().expect("date");
        let later = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().expect("date");
        assert!(!consult.is_overdue(soon));
        assert!(consult.is_overdue(later));
    }

    #[test]
    fn test_interpretation_codes() {
        assert_eq!(InterpretationCode::from_hl7("h"), Some(InterpretationCode::High));
        assert_eq!(
            InterpretationCode::from_hl7("urn:hl7:observation-interpretation:LL"),
            Some(InterpretationCode::CriticalLow)
        );
        assert_eq!(InterpretationCode::from_hl7("?"), None);
    }
}
