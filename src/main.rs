use axum::{
    Router,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use vpr_cache::{BackendHealth, CacheConfig, LazyPatientDataCache, PatientCacheKey};
use vpr_core::{
    CallerIdentityResolver, CollectionSummary, ConfigIdentityResolver, CoreConfig, HttpVistaClient,
    PatientDataCollection, PatientDataError, VistaRpcClient, get_patient_data,
};
use vpr_types::{CallerId, PatientId, StationId};

/// Application state shared across REST API handlers
///
/// Holds the Vista client, the lazily built patient cache and the resolver that supplies a
/// caller when a request does not name one.
#[derive(Clone)]
struct AppState {
    client: Arc<dyn VistaRpcClient>,
    cache: Arc<LazyPatientDataCache>,
    identity: Arc<dyn CallerIdentityResolver>,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct HealthRes {
    status: String,
    service: String,
    #[schema(value_type = Object)]
    cache: BackendHealth,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct PatientDataRes {
    success: bool,
    #[schema(value_type = Object)]
    data: PatientDataCollection,
    #[schema(value_type = Object)]
    summary: CollectionSummary,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct InvalidateRes {
    invalidated: bool,
    key: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct ErrorRes {
    success: bool,
    error_type: String,
    error_code: String,
    message: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct CallerQuery {
    /// VistA DUZ of the caller; the configured default is used when absent
    duz: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorRes>);

#[derive(OpenApi)]
#[openapi(
    paths(health, get_patient, invalidate_patient),
    components(schemas(HealthRes, PatientDataRes, InvalidateRes, ErrorRes))
)]
struct ApiDoc;

/// Main entry point for the VPR gateway
///
/// Serves patient data over REST on port 3000 (configurable via VPR_REST_ADDR).
///
/// # Environment Variables
/// - `VPR_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `VISTA_API_BASE_URL`: Vista API X base URL (required)
/// - `VISTA_API_TOKEN`: pre-issued bearer token for Vista API X
/// - `CACHE_BACKEND` and the other `CACHE_*` settings: see `vpr_cache::CacheConfig`
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration is invalid or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vpr_gateway=info".parse()?)
                .add_directive("vpr_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let core_config = CoreConfig::from_env()?;
    let cache_config = CacheConfig::from_env()?;
    let rest_addr = std::env::var("VPR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("++ Starting VPR gateway on {}", rest_addr);
    tracing::info!("++ Cache backend: {}", cache_config.backend.as_str());

    let state = AppState {
        client: Arc::new(HttpVistaClient::from_config(&core_config)?),
        cache: Arc::new(LazyPatientDataCache::new(cache_config)),
        identity: Arc::new(ConfigIdentityResolver::new(&core_config)),
    };

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app(state.clone())).await?;

    if let Some(cache) = state.cache.initialised() {
        cache.close().await;
    }
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients/:station/:dfn", get(get_patient))
        .route("/patients/:station/:dfn/cache", delete(invalidate_patient))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(error: PatientDataError) -> ApiError {
    let (status, error_type, error_code, message) = match error {
        PatientDataError::Vista(e) => (
            StatusCode::from_u16(e.status_code).unwrap_or(StatusCode::BAD_GATEWAY),
            e.error_type,
            e.error_code,
            e.message,
        ),
        PatientDataError::InvalidIdentifier(e) => (
            StatusCode::BAD_REQUEST,
            "INVALID_IDENTIFIER".to_owned(),
            "BAD_REQUEST".to_owned(),
            e.to_string(),
        ),
        PatientDataError::Cache(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "CACHE_ERROR".to_owned(),
            "CACHE_UNAVAILABLE".to_owned(),
            e.to_string(),
        ),
        PatientDataError::InvalidConfig(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONFIG_ERROR".to_owned(),
            "INVALID_CONFIG".to_owned(),
            message,
        ),
    };
    (
        status,
        Json(ErrorRes {
            success: false,
            error_type,
            error_code,
            message,
        }),
    )
}

/// Validate the path and query identifiers, filling the caller from the resolver.
fn patient_key(
    state: &AppState,
    station: &str,
    dfn: &str,
    duz: Option<&str>,
) -> Result<PatientCacheKey, PatientDataError> {
    let caller = match duz {
        Some(duz) => CallerId::new(duz)?,
        None => state.identity.default_caller(),
    };
    Ok(PatientCacheKey::new(
        StationId::new(station)?,
        PatientId::new(dfn)?,
        caller,
    ))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Reports the service status together with the health of the cache backend. A cache that
/// cannot be built is reported as unhealthy rather than failing the probe.
async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    let cache = match state.cache.get().await {
        Ok(cache) => cache.health().await,
        Err(e) => BackendHealth::unhealthy("uninitialised", e.to_string()),
    };
    Json(HealthRes {
        status: "ok".to_owned(),
        service: "vpr-gateway".to_owned(),
        cache,
    })
}

#[utoipa::path(
    get,
    path = "/patients/{station}/{dfn}",
    params(
        ("station" = String, Path, description = "Station number"),
        ("dfn" = String, Path, description = "Patient DFN at the station"),
        CallerQuery
    ),
    responses(
        (status = 200, description = "Parsed patient record", body = PatientDataRes),
        (status = 400, description = "Invalid identifier", body = ErrorRes),
        (status = 500, description = "RPC failed", body = ErrorRes),
        (status = 503, description = "Cache unavailable", body = ErrorRes)
    )
)]
/// Fetch a patient's record, from the cache when possible
///
/// # Returns
/// * `Ok(Json<PatientDataRes>)` - The parsed collection and its summary
/// * `Err(ApiError)` - Invalid identifiers, cache construction or RPC failure
async fn get_patient(
    State(state): State<AppState>,
    AxumPath((station, dfn)): AxumPath<(String, String)>,
    Query(query): Query<CallerQuery>,
) -> Result<Json<PatientDataRes>, ApiError> {
    let key = patient_key(&state, &station, &dfn, query.duz.as_deref()).map_err(error_response)?;
    let cache = state
        .cache
        .get()
        .await
        .map_err(|e| error_response(e.into()))?;

    match get_patient_data(
        state.client.as_ref(),
        cache,
        &key.station,
        &key.patient,
        &key.caller,
    )
    .await
    {
        Ok(data) => {
            let summary = data.summary(chrono::Utc::now());
            Ok(Json(PatientDataRes {
                success: true,
                data,
                summary,
            }))
        }
        Err(e) => {
            tracing::error!("Patient data error for {}: {}", key, e);
            Err(error_response(e))
        }
    }
}

#[utoipa::path(
    delete,
    path = "/patients/{station}/{dfn}/cache",
    params(
        ("station" = String, Path, description = "Station number"),
        ("dfn" = String, Path, description = "Patient DFN at the station"),
        CallerQuery
    ),
    responses(
        (status = 200, description = "Invalidation result", body = InvalidateRes),
        (status = 400, description = "Invalid identifier", body = ErrorRes),
        (status = 503, description = "Cache unavailable", body = ErrorRes)
    )
)]
/// Drop the cached view of a patient for one caller
async fn invalidate_patient(
    State(state): State<AppState>,
    AxumPath((station, dfn)): AxumPath<(String, String)>,
    Query(query): Query<CallerQuery>,
) -> Result<Json<InvalidateRes>, ApiError> {
    let key = patient_key(&state, &station, &dfn, query.duz.as_deref()).map_err(error_response)?;
    let cache = state
        .cache
        .get()
        .await
        .map_err(|e| error_response(e.into()))?;
    let invalidated = cache.invalidate_patient_data(&key).await;
    Ok(Json(InvalidateRes {
        invalidated,
        key: key.render(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use vpr_core::{RpcInvocation, VistaError};

    struct FakeClient {
        response: Result<Value, VistaError>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl VistaRpcClient for FakeClient {
        async fn invoke(&self, _invocation: &RpcInvocation) -> Result<Value, VistaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn document() -> Value {
        json!({
            "data": {
                "items": [{
                    "uid": "urn:va:patient:500:237:237",
                    "fullName": "ANDERSON,JAMES",
                    "familyName": "ANDERSON",
                    "givenNames": "JAMES",
                    "dateOfBirth": "19500315",
                    "genderCode": "urn:va:gender:M",
                    "genderName": "Male",
                    "icn": "10108V420871"
                }]
            }
        })
    }

    fn state(response: Result<Value, VistaError>) -> (AppState, Arc<FakeClient>) {
        let client = Arc::new(FakeClient {
            response,
            calls: AtomicUsize::new(0),
        });
        let core = CoreConfig::from_lookup(|_| None).expect("config");
        let state = AppState {
            client: client.clone(),
            cache: Arc::new(LazyPatientDataCache::new(CacheConfig::default())),
            identity: Arc::new(ConfigIdentityResolver::new(&core)),
        };
        (state, client)
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn test_health_reports_cache() {
        let (state, _) = state(Ok(document()));
        let (status, body) = send(app(state), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cache"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_get_patient_is_cached() {
        let (state, client) = state(Ok(document()));
        let (status, body) = send(app(state.clone()), "GET", "/patients/500/237").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["summary"]["patient"]["name"], "ANDERSON,JAMES");

        let (status, _) = send(app(state), "GET", "/patients/500/237").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rpc_failure_maps_to_error_body() {
        let (state, _) = state(Err(VistaError::new(
            "RpcFault",
            "RPC",
            "RPC not found",
            404,
        )));
        let (status, body) = send(app(state), "GET", "/patients/500/237?duz=983").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error_type"], "RPC_ERROR");
        assert_eq!(body["error_code"], "RPC_FAILED");
        assert_eq!(body["message"], "The requested operation is not available.");
    }

    #[tokio::test]
    async fn test_invalid_station_is_bad_request() {
        let (state, client) = state(Ok(document()));
        let (status, body) = send(app(state), "GET", "/patients/5:00/237").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_type"], "INVALID_IDENTIFIER");
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalidate_patient() {
        let (state, client) = state(Ok(document()));
        send(app(state.clone()), "GET", "/patients/500/237").await;

        let (status, body) = send(app(state.clone()), "DELETE", "/patients/500/237/cache").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["invalidated"], true);
        assert_eq!(body["key"], "patient:v1:500:237:10000000219");

        let (_, body) = send(app(state.clone()), "DELETE", "/patients/500/237/cache").await;
        assert_eq!(body["invalidated"], false);

        send(app(state), "GET", "/patients/500/237").await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
