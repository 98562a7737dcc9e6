//! Clinical documents: progress notes, discharge summaries and consult reports.

use super::de;
use super::order::Clinician;
use super::{fill_facility, fill_local_id, raw_text, Keyed, ParseContext, RawItem, VprEntity};
use crate::{ParseError, ParseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentClass {
    ProgressNotes,
    DischargeSummary,
    Consult,
    Procedure,
    Unknown,
}

/// A coded national title attribute, such as the title itself or its role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NationalTitlePart {
    #[serde(alias = "title", alias = "role", alias = "subject", alias = "type")]
    pub name: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub vuid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentText {
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub uid: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub content: String,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub status: String,
    #[serde(default)]
    pub clinicians: Vec<Clinician>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub uid: String,
    #[serde(deserialize_with = "de::string")]
    pub local_id: String,
    #[serde(deserialize_with = "de::string")]
    pub facility_code: String,
    pub facility_name: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub document_class: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub document_type_code: String,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub document_type_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub local_title: Option<String>,
    #[serde(default)]
    pub national_title: Option<NationalTitlePart>,
    #[serde(default)]
    pub national_title_role: Option<NationalTitlePart>,
    #[serde(default)]
    pub national_title_subject: Option<NationalTitlePart>,
    #[serde(default)]
    pub national_title_type: Option<NationalTitlePart>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub encounter_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub encounter_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub entered: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub reference_date_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::text_or_empty")]
    pub status_name: String,
    #[serde(default)]
    pub text: Vec<DocumentText>,
}

impl Document {
    pub fn is_completed(&self) -> bool {
        self.status_name.eq_ignore_ascii_case("COMPLETED")
    }

    pub fn document_type(&self) -> DocumentClass {
        match self.document_class.to_uppercase().as_str() {
            "PROGRESS NOTES" => DocumentClass::ProgressNotes,
            "DISCHARGE SUMMARY" => DocumentClass::DischargeSummary,
            "CONSULT" => DocumentClass::Consult,
            "PROCEDURE" => DocumentClass::Procedure,
            _ => DocumentClass::Unknown,
        }
    }

    fn clinicians(&self) -> impl Iterator<Item = &Clinician> {
        self.text.iter().flat_map(|text| text.clinicians.iter())
    }

    /// True when a signer has left an electronic signature.
    pub fn has_signature(&self) -> bool {
        self.clinicians()
            .any(|clinician| clinician.role == "S" && clinician.signature.is_some())
    }

    pub fn primary_author(&self) -> Option<&str> {
        self.clinicians()
            .find(|clinician| clinician.role == "A")
            .map(|clinician| clinician.name.as_str())
    }

    /// The start of each text block, joined with ` | `.
    pub fn content_summary(&self) -> String {
        self.text
            .iter()
            .map(|text| text.content.trim())
            .filter(|content| !content.is_empty())
            .map(|content| match content.char_indices().nth(SUMMARY_CHARS) {
                Some((cut, _)) => format!("{}...", &content[..cut]),
                None => content.to_owned(),
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl Keyed for Document {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl VprEntity for Document {
    const KIND: &'static str = "document";

    fn preprocess(item: &mut RawItem, ctx: &ParseContext) -> ParseResult<()> {
        if raw_text(item, "uid").map_or(true, |uid| uid.is_empty()) {
            return Err(ParseError::Skipped("document without uid".to_owned()));
        }
        fill_local_id(item);
        fill_facility(item, &ctx.station);
        Ok(())
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        self.reference_date_time.or(self.entered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn ctx() -> ParseContext {
        ParseContext::new("500", "237")
    }

    fn progress_note() -> Value {
        json!({
            "uid": "urn:va:document:500:237:4120",
            "facilityCode": "500",
            "facilityName": "CAMP MASTER",
            "documentClass": "PROGRESS NOTES",
            "documentTypeCode": "PN",
            "documentTypeName": "Progress Note",
            "localTitle": "PRIMARY CARE NOTE",
            "nationalTitle": {"title": "PRIMARY CARE NOTE", "vuid": "urn:va:vuid:4696123"},
            "nationalTitleRole": {"role": "NOTE", "vuid": "urn:va:vuid:4696124"},
            "entered": "20240110103000",
            "referenceDateTime": "20240110100000",
            "statusName": "COMPLETED",
            "text": [{
                "uid": "urn:va:document:500:237:4120",
                "content": "Patient seen for follow up.",
                "dateTime": "20240110100000",
                "status": "COMPLETED",
                "clinicians": [
                    {"name": "PROVIDER,ONE", "role": "A", "uid": "urn:va:user:500:983"},
                    {"name": "PROVIDER,ONE", "role": "S", "signature": "ONE PROVIDER MD", "uid": "urn:va:user:500:983"}
                ]
            }]
        })
    }

    #[test]
    fn test_builds_progress_note() {
        let document = Document::from_item(&progress_note(), &ctx()).expect("document");
        assert_eq!(document.local_id, "4120");
        assert_eq!(document.document_type(), DocumentClass::ProgressNotes);
        assert!(document.is_completed());
        assert!(document.has_signature());
        assert_eq!(document.primary_author(), Some("PROVIDER,ONE"));
        assert_eq!(document.content_summary(), "Patient seen for follow up.");
        let title = document.national_title.as_ref().expect("title");
        assert_eq!(title.name, "PRIMARY CARE NOTE");
        assert_eq!(document.recency(), document.reference_date_time);
    }

    #[test]
    fn test_long_content_is_cut() {
        let mut document = Document::from_item(&progress_note(), &ctx()).expect("document");
        document.text[0].content = "x".repeat(250);
        let summary = document.content_summary();
        assert_eq!(summary.len(), SUMMARY_CHARS + 3);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_sparse_document_gets_defaults() {
        let document = Document::from_item(
            &json!({"uid": "urn:va:document:500:237:77", "documentClass": "misc"}),
            &ctx(),
        )
        .expect("document");
        assert_eq!(document.facility_code, "500");
        assert_eq!(document.document_type(), DocumentClass::Unknown);
        assert!(!document.has_signature());
        assert_eq!(document.primary_author(), None);
        assert_eq!(document.content_summary(), "");
        assert_eq!(document.recency(), None);
    }
}
