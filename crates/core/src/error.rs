//! Error types for parsing, RPC calls and patient data access.

use serde::{Deserialize, Serialize};

/// Failures turning a raw VPR document into a [`crate::PatientDataCollection`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("VPR response is empty")]
    EmptyInput,
    #[error("VPR response contains no items")]
    NoItems,
    #[error("VPR response has no patient record; demographics are required")]
    MissingDemographics,
    #[error("failed to build demographics: {0}")]
    Demographics(serde_json::Error),
    #[error("{kind} item is not a JSON object")]
    NotAnObject { kind: &'static str },
    #[error("item rejected before parsing: {0}")]
    Skipped(String),
    #[error("invalid {kind} item {uid}: {source}")]
    Entity {
        kind: &'static str,
        uid: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read VPR document: {0}")]
    Json(serde_json::Error),
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// A typed error raised by a Vista RPC client.
///
/// Field names mirror the error body Vista API X returns so the value can be logged or forwarded
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{error_type} ({error_code}): {message}")]
pub struct VistaError {
    pub error_type: String,
    pub error_code: String,
    pub message: String,
    pub status_code: u16,
}

impl VistaError {
    pub fn new(
        error_type: impl Into<String>,
        error_code: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            error_code: error_code.into(),
            message: message.into(),
            status_code,
        }
    }

    /// A transport-level failure where no HTTP response was received.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new("TransportError", "", message, 503)
    }
}

/// Failures from [`crate::get_patient_data`].
#[derive(Debug, thiserror::Error)]
pub enum PatientDataError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] vpr_types::TextError),
    #[error(transparent)]
    Vista(#[from] VistaError),
    #[error("cache unavailable: {0}")]
    Cache(#[from] vpr_cache::CacheError),
}

pub type PatientDataResult<T> = std::result::Result<T, PatientDataError>;
