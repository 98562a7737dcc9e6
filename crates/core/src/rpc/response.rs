//! Standard success and error envelopes returned to callers of the pipeline.

use super::executor::RpcMetadata;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RpcMetadata>,
}

pub fn build_success_response<T>(data: Option<T>, metadata: Option<RpcMetadata>) -> ResponseEnvelope<T> {
    ResponseEnvelope {
        success: true,
        data,
        error: None,
        metadata,
    }
}

pub fn build_error_response<T>(
    error: impl Into<String>,
    metadata: Option<RpcMetadata>,
) -> ResponseEnvelope<T> {
    ResponseEnvelope {
        success: false,
        data: None,
        error: Some(error.into()),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_omits_absent_parts() {
        let envelope = build_success_response(Some(json!({"count": 2})), None);
        assert_eq!(
            serde_json::to_value(&envelope).expect("json"),
            json!({"success": true, "data": {"count": 2}})
        );
    }

    #[test]
    fn test_error_envelope() {
        let envelope: ResponseEnvelope<()> = build_error_response("station offline", None);
        assert_eq!(
            serde_json::to_value(&envelope).expect("json"),
            json!({"success": false, "error": "station offline"})
        );
    }
}
