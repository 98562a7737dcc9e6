//! Typed clinical entities parsed from VPR documents.
//!
//! Each entity is built in three steps: [`VprEntity::preprocess`] fills defaults and resolves
//! field fallbacks on the raw JSON object, serde builds the struct, and
//! [`VprEntity::finalize`] derives computed fields. Serialized field names follow the VPR
//! names, so a serialized entity deserializes back into an equal value without preprocessing.

pub mod collection;
pub mod clinical;
pub mod cpt;
pub mod de;
pub mod demographics;
pub mod diagnosis;
pub mod document;
pub mod health_factor;
pub mod medication;
pub mod order;
pub mod pov;
pub mod problem;
pub mod treatment;
pub mod visit;

use crate::{ParseError, ParseResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub use clinical::{Consult, InterpretationCode, LabResult, VitalSign};
pub use collection::{
    CollectionSummary, ConsultCounts, LabCounts, MedicationCounts, PatientDataCollection,
    PatientSummary, VisitCounts, VitalCounts,
};
pub use cpt::{parse_cpt_modifiers, CptCode};
pub use demographics::{
    PatientAddress, PatientDemographics, PatientFlag, PatientSupport, PatientTelecom, VeteranInfo,
};
pub use diagnosis::Diagnosis;
pub use document::{Document, DocumentClass, DocumentText, NationalTitlePart};
pub use health_factor::HealthFactor;
pub use medication::Medication;
pub use order::{Clinician, Order, OrderType};
pub use pov::{PovType, PurposeOfVisit};
pub use problem::{Problem, ProblemAcuity, ProblemComment, ProblemStatus};
pub use treatment::{Treatment, TreatmentStatus};
pub use visit::{Visit, VisitType};

pub type RawItem = Map<String, Value>;

/// Facts about the fetch that preprocessing may need.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub station: String,
    pub dfn: String,
    /// Substituted for missing entry dates, `YYYYMMDD`.
    pub today: String,
}

impl ParseContext {
    pub fn new(station: impl Into<String>, dfn: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            dfn: dfn.into(),
            today: crate::datetime::today_vista(),
        }
    }
}

/// An entity with a unique URN-style identifier.
pub trait Keyed {
    fn uid(&self) -> &str;
}

/// An entity that can be built from one raw VPR item.
pub trait VprEntity: Keyed + DeserializeOwned + Sized {
    /// Type tag used in log messages.
    const KIND: &'static str;

    /// Fill defaults and resolve fallbacks on the raw object.
    ///
    /// # Errors
    /// [`ParseError::Skipped`] when the item should be ignored entirely.
    fn preprocess(_item: &mut RawItem, _ctx: &ParseContext) -> ParseResult<()> {
        Ok(())
    }

    /// Derive computed fields after construction.
    fn finalize(&mut self) {}

    /// Timestamp used to order entities newest first.
    fn recency(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn from_item(item: &Value, ctx: &ParseContext) -> ParseResult<Self> {
        let Value::Object(raw) = item else {
            return Err(ParseError::NotAnObject { kind: Self::KIND });
        };
        let mut raw = raw.clone();
        Self::preprocess(&mut raw, ctx)?;

        let uid = raw
            .get("uid")
            .and_then(Value::as_str)
            .unwrap_or("<missing uid>")
            .to_owned();
        let mut entity: Self =
            serde_json::from_value(Value::Object(raw)).map_err(|source| ParseError::Entity {
                kind: Self::KIND,
                uid,
                source,
            })?;
        entity.finalize();
        Ok(entity)
    }
}

/// Entities keyed by uid, kept in insertion (or sorted) order.
///
/// Serializes as a JSON array. Inserting an entity whose uid is already present replaces it in
/// place.
#[derive(Debug, Clone)]
pub struct EntityMap<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for EntityMap<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Keyed> EntityMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entity`, returning the entity it replaced.
    pub fn insert(&mut self, entity: T) -> Option<T> {
        match self.index.get(entity.uid()) {
            Some(&position) => Some(std::mem::replace(&mut self.items[position], entity)),
            None => {
                self.index.insert(entity.uid().to_owned(), self.items.len());
                self.items.push(entity);
                None
            }
        }
    }

    pub fn get(&self, uid: &str) -> Option<&T> {
        self.index.get(uid).map(|&position| &self.items[position])
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.index.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Reorder newest first by `key`. Entities without a timestamp go last; ties keep their
    /// relative order.
    pub fn sort_newest_first_by<F>(&mut self, key: F)
    where
        F: Fn(&T) -> Option<DateTime<Utc>>,
    {
        self.items.sort_by(|a, b| key(b).cmp(&key(a)));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .items
            .iter()
            .enumerate()
            .map(|(position, entity)| (entity.uid().to_owned(), position))
            .collect();
    }
}

impl<T: VprEntity> EntityMap<T> {
    pub fn sort_newest_first(&mut self) {
        self.sort_newest_first_by(T::recency);
    }
}

impl<T: Keyed> FromIterator<T> for EntityMap<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut map = Self::new();
        for entity in iter {
            map.insert(entity);
        }
        map
    }
}

impl<'a, T> IntoIterator for &'a EntityMap<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: PartialEq> PartialEq for EntityMap<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Serialize> Serialize for EntityMap<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(&self.items)
    }
}

impl<'de, T> Deserialize<'de> for EntityMap<T>
where
    T: Deserialize<'de> + Keyed,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}

// Preprocessing helpers shared by the entity modules.

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Text of a scalar raw value.
pub(crate) fn raw_text(item: &RawItem, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-blank value among `keys`.
pub(crate) fn first_present(item: &RawItem, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .find(|value| !is_blank(value))
        .cloned()
}

/// Set `key` to the first non-blank value among `keys`, or to `default`.
pub(crate) fn fill_from(item: &mut RawItem, key: &str, keys: &[&str], default: Option<&str>) {
    let mut candidates = vec![key];
    candidates.extend_from_slice(keys);
    let resolved =
        first_present(item, &candidates).or_else(|| default.map(|d| Value::String(d.to_owned())));
    if let Some(value) = resolved {
        item.insert(key.to_owned(), value);
    }
}

/// Set `key` to `default` when it is missing or blank.
pub(crate) fn fill_default(item: &mut RawItem, key: &str, default: &str) {
    if item.get(key).map_or(true, is_blank) {
        item.insert(key.to_owned(), Value::String(default.to_owned()));
    }
}

/// The local id implied by a uid: its last segment when the uid has at least four.
pub(crate) fn local_id_from_uid(uid: &str) -> String {
    let parts: Vec<&str> = uid.split(':').collect();
    if parts.len() >= 4 {
        parts[parts.len() - 1].to_owned()
    } else {
        "0".to_owned()
    }
}

pub(crate) fn fill_local_id(item: &mut RawItem) {
    if item.get("localId").map_or(true, is_blank) {
        let uid = raw_text(item, "uid").unwrap_or_default();
        item.insert("localId".to_owned(), Value::String(local_id_from_uid(&uid)));
    }
}

/// Defaults shared by entities that carry a facility.
pub(crate) fn fill_facility(item: &mut RawItem, default_code: &str) {
    fill_default(item, "facilityCode", default_code);
    fill_default(item, "facilityName", "UNKNOWN FACILITY");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        uid: String,
        at: Option<i64>,
    }

    impl Keyed for Entry {
        fn uid(&self) -> &str {
            &self.uid
        }
    }

    fn entry(uid: &str, at: Option<i64>) -> Entry {
        Entry {
            uid: uid.into(),
            at,
        }
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut map = EntityMap::new();
        map.insert(entry("a", Some(1)));
        map.insert(entry("b", Some(2)));
        let replaced = map.insert(entry("a", Some(3)));
        assert_eq!(replaced, Some(entry("a", Some(1))));
        assert_eq!(map.len(), 2);
        assert_eq!(map.first(), Some(&entry("a", Some(3))));
        assert_eq!(map.get("b"), Some(&entry("b", Some(2))));
    }

    #[test]
    fn test_sort_newest_first_puts_undated_last() {
        let mut map: EntityMap<Entry> = [entry("old", Some(1)), entry("none", None), entry("new", Some(9))]
            .into_iter()
            .collect();
        map.sort_newest_first_by(|e| e.at.and_then(|s| Utc.timestamp_opt(s, 0).single()));
        let order: Vec<&str> = map.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(order, vec!["new", "old", "none"]);
        assert_eq!(map.get("old"), Some(&entry("old", Some(1))));
    }

    #[test]
    fn test_serializes_as_array_and_reads_back() {
        let map: EntityMap<Entry> = [entry("a", Some(1)), entry("b", None)].into_iter().collect();
        let value = serde_json::to_value(&map).expect("serialize");
        assert!(value.is_array());
        let back: EntityMap<Entry> = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, map);
        assert!(back.contains("b"));
    }

    #[test]
    fn test_local_id_from_uid() {
        assert_eq!(local_id_from_uid("urn:va:factor:500:237:44"), "44");
        assert_eq!(local_id_from_uid("urn:va:factor"), "0");
    }

    #[test]
    fn test_fill_from_prefers_existing_then_fallbacks() {
        let mut item: RawItem = serde_json::from_value(serde_json::json!({
            "name": "METFORMIN", "drugName": "X"
        }))
        .expect("object");
        fill_from(&mut item, "productFormName", &["name", "drugName"], Some("UNKNOWN"));
        assert_eq!(item["productFormName"], "METFORMIN");

        let mut empty = RawItem::new();
        fill_from(&mut empty, "productFormName", &["name"], Some("UNKNOWN"));
        assert_eq!(empty["productFormName"], "UNKNOWN");
    }
}
