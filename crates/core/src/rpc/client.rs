//! Vista RPC clients.
//!
//! The pipeline talks to VistA through [`VistaRpcClient`]. [`HttpVistaClient`] is the Vista API
//! X implementation; it sends a pre-issued bearer token and never mints one itself.

use super::params::RpcParameter;
use crate::config::CoreConfig;
use crate::constants::DEFAULT_RPC_CONTEXT;
use crate::{PatientDataError, PatientDataResult, VistaError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use vpr_types::{CallerId, StationId};

/// One RPC call: which RPC, in which context, at which station, on whose behalf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcInvocation {
    pub rpc: String,
    pub context: Option<String>,
    pub parameters: Vec<RpcParameter>,
    pub station: StationId,
    pub caller: CallerId,
    pub json_result: bool,
}

impl RpcInvocation {
    pub fn new(rpc: impl Into<String>, station: StationId, caller: CallerId) -> Self {
        Self {
            rpc: rpc.into(),
            context: None,
            parameters: Vec::new(),
            station,
            caller,
            json_result: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<RpcParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_json_result(mut self, json_result: bool) -> Self {
        self.json_result = json_result;
        self
    }

    /// The context sent to VistA when none was given.
    pub fn effective_context(&self) -> &str {
        self.context.as_deref().unwrap_or(DEFAULT_RPC_CONTEXT)
    }
}

/// A client able to invoke VistA RPCs.
#[async_trait]
pub trait VistaRpcClient: Send + Sync {
    /// Invoke `invocation` and return the raw result.
    ///
    /// # Errors
    /// A [`VistaError`] carrying the failure type, code, message and HTTP-like status.
    async fn invoke(&self, invocation: &RpcInvocation) -> Result<Value, VistaError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvokeRequest<'a> {
    rpc: &'a str,
    context: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    json_result: bool,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    parameters: &'a [RpcParameter],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_type: Option<String>,
    error_code: Option<String>,
    message: Option<String>,
}

/// Vista API X over HTTP.
pub struct HttpVistaClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpVistaClient {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    /// [`PatientDataError::InvalidConfig`] when the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> PatientDataResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PatientDataError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
            client,
            timeout,
        })
    }

    /// Create a client from the resolved core configuration.
    ///
    /// # Errors
    /// [`PatientDataError::InvalidConfig`] when `VISTA_API_BASE_URL` is not set.
    pub fn from_config(config: &CoreConfig) -> PatientDataResult<Self> {
        let base_url = config.vista_base_url().ok_or_else(|| {
            PatientDataError::InvalidConfig("VISTA_API_BASE_URL is required to call VistA".into())
        })?;
        Self::new(
            base_url,
            config.vista_token().map(str::to_owned),
            config.vista_timeout(),
        )
    }

    pub fn invoke_url(&self, station: &StationId, caller: &CallerId) -> String {
        format!(
            "{}/vista-api-x/vista-sites/{}/users/{}/rpc/invoke",
            self.base_url, station, caller
        )
    }

    fn transport_error(&self, e: reqwest::Error) -> VistaError {
        if e.is_timeout() {
            VistaError::new(
                "VistaLinkFault",
                "TIMEOUT",
                format!("request timeout after {}s", self.timeout.as_secs()),
                504,
            )
        } else if e.is_connect() {
            VistaError::new(
                "VistaLinkFault",
                "CONNECT",
                format!("failed to connect to {}", self.base_url),
                503,
            )
        } else {
            VistaError::transport(e.to_string())
        }
    }
}

/// Take the result out of the Vista API X envelope: `payload`, then `payload.result`.
pub(crate) fn unwrap_payload(body: Value) -> Value {
    let Value::Object(mut envelope) = body else {
        return body;
    };
    match envelope.remove("payload") {
        Some(Value::Object(mut payload)) => match payload.remove("result") {
            Some(result) => result,
            None => Value::Object(payload),
        },
        Some(payload) => payload,
        None => Value::Object(envelope),
    }
}

/// Build the error for a non-success response, preferring the fields of a JSON error body.
pub(crate) fn error_from_response(status: u16, body: &str) -> VistaError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => VistaError::new(
            parsed.error_type.unwrap_or_else(|| "Unknown".to_owned()),
            parsed.error_code.unwrap_or_default(),
            parsed
                .message
                .unwrap_or_else(|| format!("HTTP {status} from Vista API X")),
            status,
        ),
        Err(_) => VistaError::new(
            "HTTPError",
            status.to_string(),
            format!("HTTP {status} from Vista API X: {}", body.trim()),
            status,
        ),
    }
}

#[async_trait]
impl VistaRpcClient for HttpVistaClient {
    async fn invoke(&self, invocation: &RpcInvocation) -> Result<Value, VistaError> {
        let url = self.invoke_url(&invocation.station, &invocation.caller);
        let body = InvokeRequest {
            rpc: &invocation.rpc,
            context: invocation.effective_context(),
            json_result: invocation.json_result,
            parameters: &invocation.parameters,
        };

        tracing::debug!(
            "invoking RPC {} at station {}",
            invocation.rpc,
            invocation.station
        );

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(
                "RPC {} failed with HTTP {}",
                invocation.rpc,
                status.as_u16()
            );
            return Err(error_from_response(status.as_u16(), &text));
        }

        let data: Value = response.json().await.map_err(|e| {
            VistaError::new("ResponseError", "INVALID_JSON", e.to_string(), 502)
        })?;
        Ok(unwrap_payload(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (StationId, CallerId) {
        (
            StationId::new("500").expect("station"),
            CallerId::new("10000000219").expect("duz"),
        )
    }

    #[test]
    fn test_invoke_url() {
        let client =
            HttpVistaClient::new("https://vista.example.org/", None, Duration::from_secs(5))
                .expect("client");
        let (station, caller) = ids();
        assert_eq!(
            client.invoke_url(&station, &caller),
            "https://vista.example.org/vista-api-x/vista-sites/500/users/10000000219/rpc/invoke"
        );
    }

    #[test]
    fn test_request_body_omits_empty_fields() {
        let plain = InvokeRequest {
            rpc: "ORWU USERINFO",
            context: DEFAULT_RPC_CONTEXT,
            json_result: false,
            parameters: &[],
        };
        assert_eq!(
            serde_json::to_value(&plain).expect("json"),
            json!({"rpc": "ORWU USERINFO", "context": "OR CPRS GUI CHART"})
        );

        let params = super::super::params::single_string("237");
        let full = InvokeRequest {
            rpc: "VPR GET PATIENT DATA JSON",
            context: "LHS RPC CONTEXT",
            json_result: true,
            parameters: &params,
        };
        assert_eq!(
            serde_json::to_value(&full).expect("json"),
            json!({
                "rpc": "VPR GET PATIENT DATA JSON",
                "context": "LHS RPC CONTEXT",
                "jsonResult": true,
                "parameters": [{"string": "237"}]
            })
        );
    }

    #[test]
    fn test_unwrap_payload() {
        assert_eq!(
            unwrap_payload(json!({"payload": {"result": "1^OK"}})),
            json!("1^OK")
        );
        assert_eq!(
            unwrap_payload(json!({"payload": {"data": {"items": []}}})),
            json!({"data": {"items": []}})
        );
        assert_eq!(unwrap_payload(json!({"data": 1})), json!({"data": 1}));
        assert_eq!(unwrap_payload(json!("raw")), json!("raw"));
    }

    #[test]
    fn test_error_from_response() {
        let typed = error_from_response(
            403,
            r#"{"errorType":"SecurityFault","errorCode":"SEC-1","message":"no station access"}"#,
        );
        assert_eq!(typed.error_type, "SecurityFault");
        assert_eq!(typed.error_code, "SEC-1");
        assert_eq!(typed.status_code, 403);

        let untyped = error_from_response(502, "<html>bad gateway</html>");
        assert_eq!(untyped.error_type, "HTTPError");
        assert_eq!(untyped.error_code, "502");
    }

    #[test]
    fn test_from_config_requires_base_url() {
        let config = CoreConfig::from_lookup(|_| None).expect("config");
        assert!(matches!(
            HttpVistaClient::from_config(&config),
            Err(PatientDataError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_vista_error() {
        let client = HttpVistaClient::new("http://127.0.0.1:9", None, Duration::from_secs(2))
            .expect("client");
        let (station, caller) = ids();
        let invocation = RpcInvocation::new("ORWU USERINFO", station, caller);
        let err = client.invoke(&invocation).await.expect_err("no server");
        assert!(err.status_code >= 500);
    }
}
