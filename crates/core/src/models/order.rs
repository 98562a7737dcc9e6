//! Clinical orders and the clinicians attached to orders and notes.

use super::de;
use super::{fill_facility, fill_local_id, raw_text, Keyed, ParseContext, RawItem, VprEntity};
use crate::{ParseError, ParseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A clinician who acted on an order or a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clinician {
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub name: String,
    /// `A` author, `S` signer, `C` cosigner.
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub role: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub signature: Option<String>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub signed_date_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub uid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Consult,
    Medication,
    Lab,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub entered: Option<DateTime<Utc>>,
    /// Owning package, such as `LR`, `GMRC` or `PSO`.
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub service: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub status_code: String,
    #[serde(rename = "statusName", default, deserialize_with = "de::text_or_empty")]
    pub status: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub status_vuid: Option<String>,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub display_group: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub oi_code: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub oi_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub oi_package_ref: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_uid: Option<String>,
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub stop: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub location_uid: Option<String>,
    #[serde(default)]
    pub clinicians: Vec<Clinician>,
    /// Replacement order for a discontinued one.
    #[serde(default, deserialize_with = "de::opt_string")]
    pub successor: Option<String>,
}

impl Order {
    pub fn is_active(&self) -> bool {
        matches!(
            self.status.to_uppercase().as_str(),
            "ACTIVE" | "PENDING" | "SCHEDULED"
        )
    }

    pub fn order_type(&self) -> OrderType {
        match self.display_group.as_str() {
            "CH" => OrderType::Lab,
            "CSLT" => OrderType::Consult,
            "O RX" | "NV RX" => OrderType::Medication,
            _ => OrderType::Unknown,
        }
    }

    pub fn is_non_va_medication(&self) -> bool {
        self.display_group.eq_ignore_ascii_case("NV RX")
    }
}

impl Keyed for Order {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for Order {
    const KIND: &'static str = "order";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        if raw_text(item, "uid").map_or(true, |uid| uid.is_empty()) {
            return Err(ParseError::Skipped("order without uid".to_owned()));
        }
        fill_local_id(item);
        fill_facility(item, &ctx.station);
        Ok(())
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        self.entered.or(self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ParseContext {
        ParseContext::new("500", "237")
    }

    fn lab_order() -> Value {
        json!({
            "uid": "urn:va:order:500:237:33418",
            "facilityCode": 500,
            "facilityName": "CAMP MASTER",
            "entered": "20240112093000",
            "service": "LR",
            "statusCode": "urn:va:order-status:actv",
            "statusName": "ACTIVE",
            "statusVuid": "urn:va:vuid:4501114",
            "displayGroup": "CH",
            "content": "GLUCOSE BLOOD SERUM SP LB #1234",
            "oiCode": "urn:va:oi:375",
            "oiName": "GLUCOSE",
            "providerName": "PROVIDER,ONE",
            "clinicians": [
                {"name": "PROVIDER,ONE", "role": "S", "signedDateTime": "20240112093100", "uid": "urn:va:user:500:983"}
            ]
        })
    }

    #[test]
    fn test_builds_lab_order() {
        let order = Order::from_item(&lab_order(), &ctx()).expect("order");
        assert_eq!(order.local_id, "33418");
        assert_eq!(order.facility_code, "500");
        assert_eq!(order.order_type(), OrderType::Lab);
        assert!(order.is_active());
        assert!(!order.is_non_va_medication());
        assert_eq!(order.clinicians.len(), 1);
        assert!(order.clinicians[0].signed_date_time.is_some());
        assert_eq!(order.recency(), order.entered);
    }

    #[test]
    fn test_order_type_and_status() {
        let mut order = Order::from_item(&lab_order(), &ctx()).expect("order");
        order.display_group = "NV RX".to_owned();
        order.status = "COMPLETE".to_owned();
        assert_eq!(order.order_type(), OrderType::Medication);
        assert!(order.is_non_va_medication());
        assert!(!order.is_active());

        order.display_group = "CSLT".to_owned();
        assert_eq!(order.order_type(), OrderType::Consult);
        order.display_group = "O".to_owned();
        assert_eq!(order.order_type(), OrderType::Unknown);
    }

    #[test]
    fn test_missing_facility_uses_station() {
        let order = Order::from_item(
            &json!({"uid": "urn:va:order:500:237:9", "start": "20240101"}),
            &ctx(),
        )
        .expect("order");
        assert_eq!(order.facility_code, "500");
        assert_eq!(order.facility_name, "UNKNOWN FACILITY");
        assert!(order.entered.is_none());
        assert_eq!(order.recency(), order.start);
    }

    #[test]
    fn test_order_without_uid_is_skipped() {
        let result = Order::from_item(&json!({"service": "LR"}), &ctx());
        assert!(matches!(result, Err(ParseError::Skipped(_))));
    }
}
