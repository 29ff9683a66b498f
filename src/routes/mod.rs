use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::{
    clamp_test_configuration, Config, MAX_CONCURRENCY, MAX_PAYLOAD_BYTES, MAX_REQUESTS,
};
use crate::error::ApiError;
use crate::models::{Protocol, TestConfiguration, TestRecord};
use crate::orchestrator::Orchestrator;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: Arc<Config>,
}

/// Health check routes
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Performance test routes
pub fn performance_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/performance/config", get(config_handler))
        .route(
            "/api/v1/performance/tests",
            get(list_tests_handler).post(start_test_handler),
        )
        .route("/api/v1/performance/tests/run", post(run_test_handler))
        .route("/api/v1/performance/tests/:id", get(get_test_handler))
        .with_state(state)
}

/// Build the application with all routes and middleware
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(health_routes(state.clone()))
        .merge(performance_routes(state))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Permissive CORS for browser dashboards
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// GET /health - Health check
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION,
        "runningTests": state.orchestrator.registry().running_count()
    }))
}

/// GET /api/v1/performance/config - Defaults, limits and upstream targets
async fn config_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "protocols": Protocol::ALL,
        "defaults": TestConfiguration::default(),
        "limits": {
            "maxRequests": MAX_REQUESTS,
            "maxConcurrency": MAX_CONCURRENCY,
            "maxPayloadBytes": MAX_PAYLOAD_BYTES,
        },
        "upstreams": {
            "binaryRpc": state.config.drivers.grpc_url,
            "http": state.config.drivers.http_url,
        },
        "protocolCooldownMs": state.config.protocol_cooldown.as_millis() as u64,
    }))
}

/// GET /api/v1/performance/tests - All tests, oldest first
async fn list_tests_handler(State(state): State<AppState>) -> Json<Vec<TestRecord>> {
    Json(state.orchestrator.list_tests())
}

/// POST /api/v1/performance/tests - Start a test in the background
///
/// Returns 202 with the running record; poll the status route for results.
async fn start_test_handler(
    State(state): State<AppState>,
    body: Result<Json<TestConfiguration>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let config = validate_test_configuration(body)?;
    tracing::info!(
        test_name = %config.test_name,
        num_requests = config.num_requests,
        concurrency = config.concurrency,
        "Request to start performance test"
    );

    let record = state.orchestrator.start_comparison(config);
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// POST /api/v1/performance/tests/run - Run a test and wait for the result
async fn run_test_handler(
    State(state): State<AppState>,
    body: Result<Json<TestConfiguration>, JsonRejection>,
) -> Result<Json<TestRecord>, ApiError> {
    let config = validate_test_configuration(body)?;
    tracing::info!(
        test_name = %config.test_name,
        num_requests = config.num_requests,
        concurrency = config.concurrency,
        "Request to run performance test"
    );

    let record = state.orchestrator.run_comparison(config).await?;
    Ok(Json(record))
}

/// GET /api/v1/performance/tests/:id - Status and results of one test
async fn get_test_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TestRecord>, ApiError> {
    let test_id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::ValidationError(format!("invalid test id '{}'", id)))?;
    let record = state.orchestrator.get_test_status(&test_id)?;
    Ok(Json(record))
}

fn validate_test_configuration(
    body: Result<Json<TestConfiguration>, JsonRejection>,
) -> Result<TestConfiguration, ApiError> {
    let Json(mut config) = body.map_err(|e| ApiError::ValidationError(e.body_text()))?;

    if config.protocols.is_empty() {
        return Err(ApiError::ValidationError(
            "protocols cannot be empty".to_string(),
        ));
    }
    if config.test_name.trim().is_empty() {
        config.test_name = TestConfiguration::default().test_name;
    }

    Ok(clamp_test_configuration(config))
}
