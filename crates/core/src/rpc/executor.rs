//! Standard RPC execution.
//!
//! [`execute`] invokes one RPC, feeds the raw result to a parser and shapes the outcome. Every
//! failure, from the client or from the parser, goes through the caller's error builder; nothing
//! else escapes.

use super::client::{RpcInvocation, VistaRpcClient};
use super::params::RpcParameter;
use crate::constants::RPC_SOURCE;
use crate::VistaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::time::Instant;

/// What was invoked, as reported in response metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcDetails {
    pub rpc: String,
    pub context: String,
    pub parameters: Vec<RpcParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_result: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcMetadata {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub station: String,
    pub rpc: RpcDetails,
    pub duz: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl RpcMetadata {
    pub fn for_invocation(invocation: &RpcInvocation, duration_ms: Option<u64>) -> Self {
        Self {
            timestamp: Utc::now(),
            source: RPC_SOURCE.to_owned(),
            station: invocation.station.to_string(),
            rpc: RpcDetails {
                rpc: invocation.rpc.clone(),
                context: invocation.effective_context().to_owned(),
                parameters: invocation.parameters.clone(),
                json_result: invocation.json_result.then_some(true),
            },
            duz: invocation.caller.to_string(),
            duration_ms,
        }
    }
}

/// A parsed RPC result with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcSuccess<T> {
    pub parsed_data: T,
    pub metadata: RpcMetadata,
}

/// Translate a Vista error into a message fit for an end user.
pub fn translate_vista_error(error: &VistaError) -> String {
    let message = error.message.to_lowercase();
    match error.error_type.as_str() {
        "SecurityFault" if message.contains("permission") => {
            "You don't have permission to perform this operation. Please check your access rights."
                .to_owned()
        }
        "SecurityFault" if message.contains("station") => {
            "Access denied to the requested station. Please verify station access.".to_owned()
        }
        "SecurityFault" => "Security error: Access denied.".to_owned(),
        "VistaLinkFault" if message.contains("connect") => {
            "Cannot connect to VistA system. The station may be offline or unreachable.".to_owned()
        }
        "VistaLinkFault" if message.contains("timeout") => {
            "Connection to VistA timed out. Please try again.".to_owned()
        }
        "VistaLinkFault" => format!("VistA connection error: {}", error.message),
        "RpcFault" if message.contains("not found") => {
            "The requested operation is not available.".to_owned()
        }
        "RpcFault" if message.contains("parameter") => {
            "Invalid parameters provided for the operation.".to_owned()
        }
        "RpcFault" => format!("Operation failed: {}", error.message),
        "JwtException" => "Authentication error. Please check your credentials.".to_owned(),
        other => format!("{}: {}", other, error.message),
    }
}

/// Invoke `invocation` through `client` and parse the result.
///
/// # Arguments
/// * `parser` - turns the raw result into `T`. Its error is reported as unexpected.
/// * `error_builder` - shapes a user-facing message and the call metadata into `E`.
///
/// # Errors
/// Whatever `error_builder` makes of a client or parser failure.
pub async fn execute<T, E, P, PE, B>(
    client: &dyn VistaRpcClient,
    invocation: &RpcInvocation,
    parser: P,
    error_builder: B,
) -> Result<RpcSuccess<T>, E>
where
    P: FnOnce(Value) -> Result<T, PE>,
    PE: Display,
    B: FnOnce(String, RpcMetadata) -> E,
{
    let started = Instant::now();
    tracing::debug!(
        "RPC request {} at station {} for DUZ {}",
        invocation.rpc,
        invocation.station,
        invocation.caller
    );

    let raw = match client.invoke(invocation).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(
                "RPC {} failed at station {} for DUZ {}: {}",
                invocation.rpc,
                invocation.station,
                invocation.caller,
                e
            );
            let metadata = RpcMetadata::for_invocation(invocation, None);
            return Err(error_builder(translate_vista_error(&e), metadata));
        }
    };

    match parser(raw) {
        Ok(parsed_data) => {
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::info!(
                "RPC {} completed at station {} for DUZ {} in {}ms",
                invocation.rpc,
                invocation.station,
                invocation.caller,
                duration_ms
            );
            Ok(RpcSuccess {
                parsed_data,
                metadata: RpcMetadata::for_invocation(invocation, Some(duration_ms)),
            })
        }
        Err(e) => {
            tracing::error!(
                "unexpected error handling RPC {} at station {}: {}",
                invocation.rpc,
                invocation.station,
                e
            );
            let metadata = RpcMetadata::for_invocation(invocation, None);
            Err(error_builder(format!("Unexpected error: {e}"), metadata))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::params::single_string;
    use crate::rpc::response::{build_error_response, ResponseEnvelope};
    use async_trait::async_trait;
    use serde_json::json;
    use vpr_types::{CallerId, StationId};

    struct FixedClient(Result<Value, VistaError>);

    #[async_trait]
    impl VistaRpcClient for FixedClient {
        async fn invoke(&self, _invocation: &RpcInvocation) -> Result<Value, VistaError> {
            self.0.clone()
        }
    }

    fn invocation() -> RpcInvocation {
        RpcInvocation::new(
            "ORWPT ID INFO",
            StationId::new("500").expect("station"),
            CallerId::new("983").expect("duz"),
        )
        .with_parameters(single_string("237"))
    }

    fn to_envelope(message: String, metadata: RpcMetadata) -> ResponseEnvelope<()> {
        build_error_response(message, Some(metadata))
    }

    #[tokio::test]
    async fn test_success_carries_metadata() {
        let client = FixedClient(Ok(json!("666000237^2500315")));
        let outcome = execute(
            &client,
            &invocation(),
            |raw| raw.as_str().map(str::to_owned).ok_or("not text"),
            to_envelope,
        )
        .await
        .expect("success");
        assert_eq!(outcome.parsed_data, "666000237^2500315");
        assert_eq!(outcome.metadata.source, "VistA RPC");
        assert_eq!(outcome.metadata.station, "500");
        assert_eq!(outcome.metadata.duz, "983");
        assert_eq!(outcome.metadata.rpc.context, "OR CPRS GUI CHART");
        assert_eq!(outcome.metadata.rpc.json_result, None);
        assert!(outcome.metadata.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_client_error_is_translated() {
        let client = FixedClient(Err(VistaError::new(
            "SecurityFault",
            "SEC",
            "No access to station 500",
            403,
        )));
        let err = execute(&client, &invocation(), |raw| Ok::<_, String>(raw), to_envelope)
            .await
            .expect_err("failure");
        assert!(!err.success);
        assert_eq!(
            err.error.as_deref(),
            Some("Access denied to the requested station. Please verify station access.")
        );
        assert_eq!(err.metadata.expect("metadata").rpc.rpc, "ORWPT ID INFO");
    }

    #[tokio::test]
    async fn test_parser_error_is_unexpected() {
        let client = FixedClient(Ok(json!(42)));
        let err = execute(
            &client,
            &invocation(),
            |raw| raw.as_str().map(str::to_owned).ok_or("expected text"),
            to_envelope,
        )
        .await
        .expect_err("failure");
        assert_eq!(err.error.as_deref(), Some("Unexpected error: expected text"));
    }

    #[test]
    fn test_translate_vista_error() {
        let cases = [
            ("SecurityFault", "permission denied", "You don't have permission"),
            ("SecurityFault", "locked", "Security error: Access denied."),
            ("VistaLinkFault", "failed to connect", "Cannot connect to VistA"),
            ("VistaLinkFault", "request timeout after 30s", "Connection to VistA timed out"),
            ("VistaLinkFault", "broker reset", "VistA connection error: broker reset"),
            ("RpcFault", "RPC not found", "The requested operation is not available."),
            ("RpcFault", "bad parameter 2", "Invalid parameters provided"),
            ("RpcFault", "M error", "Operation failed: M error"),
            ("JwtException", "expired", "Authentication error."),
            ("Mystery", "boom", "Mystery: boom"),
        ];
        for (error_type, message, expected) in cases {
            let translated = translate_vista_error(&VistaError::new(error_type, "", message, 500));
            assert!(
                translated.starts_with(expected),
                "{error_type}/{message} gave {translated}"
            );
        }
    }
}
