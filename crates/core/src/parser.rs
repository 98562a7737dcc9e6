//! VPR response parsing.
//!
//! Turns the JSON returned by `VPR GET PATIENT DATA JSON` into a [`PatientDataCollection`].
//! Items are grouped by the type segment of their uid (`urn:va:<type>:...`) and each group is
//! parsed on its own. A malformed item is logged and dropped; only a missing or unusable
//! patient record fails the whole parse.

use crate::models::{
    Consult, CptCode, Diagnosis, Document, EntityMap, HealthFactor, LabResult, Medication, Order,
    ParseContext, PatientDataCollection, PatientDemographics, Problem, PurposeOfVisit, Treatment,
    VprEntity, Visit, VitalSign,
};
use crate::{ParseError, ParseResult};
use serde_json::Value;
use std::collections::HashMap;

type Groups<'a> = HashMap<&'a str, Vec<&'a Value>>;

/// Type tag of a raw item: segment 2 of its uid.
fn item_type(item: &Value) -> Option<&str> {
    let uid = item.get("uid")?.as_str()?;
    uid.split(':').nth(2)
}

fn group_by_type(items: &[Value]) -> Groups<'_> {
    let mut groups: Groups<'_> = HashMap::new();
    for item in items {
        match item_type(item) {
            Some(kind) => groups.entry(kind).or_default().push(item),
            None => tracing::debug!("skipping VPR item without a typed uid"),
        }
    }
    groups
}

fn items_of<'a>(document: &'a Value) -> Option<&'a Vec<Value>> {
    document
        .pointer("/data/items")
        .or_else(|| document.pointer("/payload/data/items"))
        .and_then(Value::as_array)
}

fn is_empty_document(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Parse each item of `kinds` into `T`, dropping the ones that fail, newest first.
fn parse_group<T: VprEntity>(groups: &Groups<'_>, kinds: &[&str], ctx: &ParseContext) -> EntityMap<T> {
    let mut entities = EntityMap::new();
    for item in kinds.iter().filter_map(|kind| groups.get(kind)).flatten() {
        match T::from_item(item, ctx) {
            Ok(entity) => {
                entities.insert(entity);
            }
            Err(ParseError::Skipped(reason)) => {
                tracing::debug!("skipping {} item: {}", T::KIND, reason);
            }
            Err(e) => {
                let uid = item.get("uid").and_then(Value::as_str).unwrap_or("<missing uid>");
                tracing::warn!("dropping {} item {}: {}", T::KIND, uid, e);
            }
        }
    }
    entities.sort_newest_first();
    entities
}

/// Parse a VPR document for patient `dfn` at `station`.
///
/// Accepts the Vista API X envelope (`{"payload": {"data": {"items": [...]}}}`) as well as
/// the bare `{"data": {"items": [...]}}` form.
///
/// # Errors
/// - [`ParseError::EmptyInput`] for a null or empty document.
/// - [`ParseError::NoItems`] when no item array is present or it is empty.
/// - [`ParseError::MissingDemographics`] when there is no `patient` item.
/// - [`ParseError::Demographics`] when the patient record cannot be built.
pub fn parse_vpr_patient_data(
    raw: &Value,
    station: &str,
    dfn: &str,
) -> ParseResult<PatientDataCollection> {
    if is_empty_document(raw) {
        return Err(ParseError::EmptyInput);
    }
    let document = match raw.get("payload") {
        Some(payload @ Value::Object(_)) => payload,
        _ => raw,
    };
    let items = items_of(document)
        .filter(|items| !items.is_empty())
        .ok_or(ParseError::NoItems)?;

    let groups = group_by_type(items);
    let patient = groups
        .get("patient")
        .and_then(|patients| patients.first())
        .ok_or(ParseError::MissingDemographics)?;
    let demographics = PatientDemographics::from_patient_item(patient, dfn)?;

    let ctx = ParseContext::new(station, dfn);
    let mut collection = PatientDataCollection::new(demographics, station, dfn);
    collection.vital_signs = parse_group::<VitalSign>(&groups, &["vital"], &ctx);
    collection.lab_results = parse_group::<LabResult>(&groups, &["lab"], &ctx);
    collection.consults = parse_group::<Consult>(&groups, &["consult"], &ctx);
    collection.medications = parse_group::<Medication>(&groups, &["med"], &ctx);
    collection.visits = parse_group::<Visit>(&groups, &["visit"], &ctx);
    collection.health_factors = parse_group::<HealthFactor>(&groups, &["factor"], &ctx);
    collection.treatments = parse_group::<Treatment>(&groups, &["treatment"], &ctx);
    collection.problems = parse_group::<Problem>(&groups, &["problem"], &ctx);
    collection.purpose_of_visits = parse_group::<PurposeOfVisit>(&groups, &["pov"], &ctx);
    collection.diagnoses = parse_group::<Diagnosis>(&groups, &["problem", "pov"], &ctx);
    collection.orders = parse_group::<Order>(&groups, &["order"], &ctx);
    collection.documents = parse_group::<Document>(&groups, &["document"], &ctx);
    collection.cpt_codes = parse_group::<CptCode>(&groups, &["cpt"], &ctx);
    collection.total_items = items.len();

    tracing::info!(
        "parsed VPR data for station {} patient {}: {} vitals, {} labs, {} consults, {} medications, {} visits, {} health factors, {} treatments, {} problems, {} diagnoses, {} purposes of visit, {} orders, {} documents, {} CPT codes ({} items)",
        station,
        dfn,
        collection.vital_signs.len(),
        collection.lab_results.len(),
        collection.consults.len(),
        collection.medications.len(),
        collection.visits.len(),
        collection.health_factors.len(),
        collection.treatments.len(),
        collection.problems.len(),
        collection.diagnoses.len(),
        collection.purpose_of_visits.len(),
        collection.orders.len(),
        collection.documents.len(),
        collection.cpt_codes.len(),
        collection.total_items,
    );
    Ok(collection)
}

/// [`parse_vpr_patient_data`] over JSON text.
///
/// # Errors
/// [`ParseError::Json`] when `text` is not JSON, otherwise as [`parse_vpr_patient_data`].
pub fn parse_vpr_str(text: &str, station: &str, dfn: &str) -> ParseResult<PatientDataCollection> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyInput);
    }
    let raw: Value = serde_json::from_str(text).map_err(ParseError::Json)?;
    parse_vpr_patient_data(&raw, station, dfn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient() -> Value {
        json!({
            "uid": "urn:va:patient:500:237:237",
            "fullName": "ANDERSON,JAMES",
            "familyName": "ANDERSON",
            "givenNames": "JAMES",
            "dateOfBirth": "19500315",
            "genderCode": "urn:va:gender:M",
            "genderName": "Male",
            "icn": "10108V420871"
        })
    }

    fn lab(local_id: &str, observed: &str) -> Value {
        json!({
            "uid": format!("urn:va:lab:500:237:{local_id}"),
            "typeCode": "urn:lnc:2345-7",
            "typeName": "GLUCOSE",
            "result": "110",
            "observed": observed,
            "facilityCode": "500",
            "facilityName": "CAMP MASTER",
            "statusCode": "urn:va:lab-status:completed",
            "statusName": "completed"
        })
    }

    fn vital() -> Value {
        json!({
            "uid": "urn:va:vital:500:237:1",
            "localId": "1",
            "typeCode": "urn:va:vuid:4500634",
            "typeName": "BLOOD PRESSURE",
            "displayName": "BP",
            "result": "120/80",
            "observed": "20240119",
            "facilityCode": "500",
            "facilityName": "CAMP MASTER"
        })
    }

    fn document(items: Vec<Value>) -> Value {
        json!({"data": {"items": items}})
    }

    #[test]
    fn test_groups_items_by_uid_type() {
        let raw = document(vec![vital(), lab("2", "20240110"), patient()]);
        let collection = parse_vpr_patient_data(&raw, "500", "237").expect("parse");
        assert_eq!(collection.vital_signs.len(), 1);
        assert_eq!(collection.lab_results.len(), 1);
        assert_eq!(collection.patient_name(), "ANDERSON,JAMES");
        assert_eq!(collection.total_items, 3);
        assert_eq!(collection.source_station, "500");
        assert_eq!(collection.source_dfn, "237");
        assert_eq!(collection.patient_icn(), Some("10108V420871"));
    }

    #[test]
    fn test_unwraps_payload_envelope() {
        let raw = json!({"payload": {"data": {"items": [patient(), vital()]}}});
        let collection = parse_vpr_patient_data(&raw, "500", "237").expect("parse");
        assert_eq!(collection.vital_signs.len(), 1);
    }

    #[test]
    fn test_demographics_are_required() {
        let raw = document(vec![vital()]);
        assert!(matches!(
            parse_vpr_patient_data(&raw, "500", "237"),
            Err(ParseError::MissingDemographics)
        ));

        let alone = parse_vpr_patient_data(&document(vec![patient()]), "500", "237")
            .expect("patient only");
        assert!(alone.vital_signs.is_empty());
        assert!(alone.medications.is_empty());
        assert!(!alone.has_clinical_data());
    }

    #[test]
    fn test_rejects_empty_input() {
        assert!(matches!(
            parse_vpr_patient_data(&Value::Null, "500", "237"),
            Err(ParseError::EmptyInput)
        ));
        assert!(matches!(
            parse_vpr_patient_data(&json!({}), "500", "237"),
            Err(ParseError::EmptyInput)
        ));
        assert!(matches!(
            parse_vpr_patient_data(&document(vec![]), "500", "237"),
            Err(ParseError::NoItems)
        ));
        assert!(matches!(
            parse_vpr_str("not json", "500", "237"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_labs_come_out_newest_first() {
        let raw = document(vec![
            patient(),
            lab("old", "20230101"),
            lab("new", "20240301"),
            lab("mid", "20231015"),
        ]);
        let collection = parse_vpr_patient_data(&raw, "500", "237").expect("parse");
        let order: Vec<&str> = collection
            .lab_results
            .iter()
            .map(|lab| lab.local_id.as_str())
            .collect();
        assert_eq!(order, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_malformed_item_is_dropped() {
        let mut broken = lab("bad", "20240101");
        broken.as_object_mut().expect("object").remove("typeName");
        let raw = document(vec![patient(), lab("good", "20240102"), broken]);
        let collection = parse_vpr_patient_data(&raw, "500", "237").expect("parse");
        assert_eq!(collection.lab_results.len(), 1);
        assert!(collection.lab_results.contains("urn:va:lab:500:237:good"));
    }

    #[test]
    fn test_problems_and_povs_feed_diagnoses() {
        let raw = document(vec![
            patient(),
            json!({
                "uid": "urn:va:problem:500:237:610",
                "problemText": "Hypertension",
                "icdCode": "urn:10d:I10",
                "statusCode": "urn:sct:55561003",
                "statusName": "ACTIVE",
                "entered": "20230115",
                "updated": "20240115"
            }),
            json!({
                "uid": "urn:va:pov:500:237:31",
                "name": "Chest pain",
                "type": "P",
                "encounterName": "CARDIOLOGY",
                "encounterUid": "urn:va:visit:500:237:2001",
                "entered": "20240110"
            }),
        ]);
        let collection = parse_vpr_patient_data(&raw, "500", "237").expect("parse");
        assert_eq!(collection.problems.len(), 1);
        assert_eq!(collection.purpose_of_visits.len(), 1);
        assert_eq!(collection.diagnoses.len(), 2);
        let first = collection.diagnoses.first().expect("diagnosis");
        assert_eq!(first.uid, "urn:va:pov:500:237:31");
    }

    #[test]
    fn test_collection_survives_json_round_trip() {
        let raw = document(vec![patient(), vital(), lab("2", "20240110")]);
        let collection = parse_vpr_patient_data(&raw, "500", "237").expect("parse");
        let text = serde_json::to_string(&collection).expect("serialize");
        let back: PatientDataCollection = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, collection);
    }

    #[test]
    fn test_summary_counts() {
        let mut abnormal = lab("3", "20240111");
        abnormal["interpretationCode"] = json!("urn:hl7:observation-interpretation:H");
        let raw = document(vec![patient(), vital(), lab("2", "20240110"), abnormal]);
        let collection = parse_vpr_patient_data(&raw, "500", "237").expect("parse");
        let summary = collection.summary(chrono::Utc::now());
        assert_eq!(summary.lab_results.total, 2);
        assert_eq!(summary.lab_results.abnormal, 1);
        assert_eq!(summary.vital_signs.total, 1);
        assert_eq!(summary.patient.name, "ANDERSON,JAMES");
    }

    #[test]
    fn test_orders_documents_and_cpt_codes() {
        let raw = document(vec![
            patient(),
            json!({
                "uid": "urn:va:order:500:237:33418",
                "facilityCode": "500",
                "facilityName": "CAMP MASTER",
                "entered": "20240112093000",
                "service": "LR",
                "statusName": "ACTIVE",
                "displayGroup": "CH"
            }),
            json!({
                "uid": "urn:va:document:500:237:4120",
                "documentClass": "PROGRESS NOTES",
                "referenceDateTime": "20240110100000",
                "statusName": "COMPLETED"
            }),
            json!({
                "uid": "urn:va:cpt:500:237:871",
                "cptCode": "urn:cpt:82950",
                "name": "GLUCOSE POST GLUCOSE DOSE",
                "performed": "20230605"
            }),
            json!({
                "uid": "urn:va:cpt:500:237:872",
                "cptCode": "urn:cpt:99213",
                "entered": "20240115"
            }),
            json!({"uid": "urn:va:cpt:500:237:873", "cptCode": "urn:cpt:36415"}),
        ]);
        let collection = parse_vpr_patient_data(&raw, "500", "237").expect("parse");

        assert_eq!(collection.orders.len(), 1);
        assert_eq!(collection.active_orders().count(), 1);
        assert_eq!(collection.documents.len(), 1);
        let note = collection.documents.get("urn:va:document:500:237:4120").expect("note");
        assert_eq!(note.local_id, "4120");
        assert_eq!(note.facility_code, "500");

        let codes: Vec<&str> = collection.cpt_codes.iter().map(|c| c.cpt_code.as_str()).collect();
        assert_eq!(codes, vec!["99213", "82950"]);
        let first = collection.cpt_codes.first().expect("cpt");
        assert_eq!(first.facility_name, "Station 500");

        let summary = collection.summary(chrono::Utc::now());
        assert_eq!((summary.orders, summary.documents, summary.cpt_codes), (1, 1, 2));
    }
}
