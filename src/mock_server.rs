//! Mock echo upstream speaking the HTTP side of the echo contract.

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::MAX_PAYLOAD_BYTES;
use crate::drivers::http::PROCESS_PATH;
use crate::models::PayloadMode;
use crate::payload;

pub const HEALTH_PATH: &str = "/api/v1/performance/health";

/// Largest accepted request body: a base64-encoded maximum payload plus envelope
const MAX_BODY_BYTES: usize = MAX_PAYLOAD_BYTES.div_ceil(3) * 4 + 64 * 1024;

/// Mock server behaviour
#[derive(Debug, Clone, Default)]
pub struct MockServerConfig {
    /// Port to listen on (0 = random)
    pub port: u16,
    /// Fixed latency per request
    pub latency_ms: u64,
    /// Extra random latency, uniform in `0..=jitter_ms`
    pub jitter_ms: u64,
    /// Fraction of requests answered with 500
    pub error_rate: f64,
}

/// In-process echo server
pub struct MockEchoServer {
    config: MockServerConfig,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockEchoServer {
    pub fn new(config: MockServerConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            port: 0,
        }
    }

    /// Start the mock server and return the actual port
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        self.port = port;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = router(self.config.clone());
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tracing::info!(port, "Mock echo upstream listening");
        Ok(port)
    }

    /// Base URL for the HTTP driver
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockEchoServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Router of the echo upstream
pub fn router(config: MockServerConfig) -> Router {
    Router::new()
        .route(PROCESS_PATH, post(handle_process))
        .route(HEALTH_PATH, get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(Arc::new(config))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessQuery {
    response_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ProcessBody {
    id: String,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    payload: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

async fn handle_process(
    State(config): State<Arc<MockServerConfig>>,
    Query(query): Query<ProcessQuery>,
    Json(body): Json<ProcessBody>,
) -> Response {
    let start = Instant::now();

    let decoded = match STANDARD.decode(body.payload.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "id": body.id,
                    "statusCode": 400,
                    "message": format!("Invalid base64 payload: {}", e),
                })),
            )
                .into_response();
        }
    };

    let (delay, fail) = {
        let mut rng = rand::thread_rng();
        let jitter = if config.jitter_ms > 0 {
            rng.gen_range(0..=config.jitter_ms)
        } else {
            0
        };
        let fail = config.error_rate > 0.0 && rng.gen::<f64>() < config.error_rate;
        (Duration::from_millis(config.latency_ms + jitter), fail)
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if fail {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Simulated error").into_response();
    }

    let response_size = query
        .response_size
        .or_else(|| {
            body.metadata
                .get("expectedResponseSize")
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(decoded.len());
    let mode = match body.metadata.get("contentType").map(String::as_str) {
        Some("application/json") => PayloadMode::Structured,
        _ => PayloadMode::Binary,
    };
    let reply = payload::generate(response_size, mode);

    let mut metadata = body.metadata;
    metadata.insert("receivedBytes".to_string(), decoded.len().to_string());
    metadata.insert("requestTimestamp".to_string(), body.timestamp.to_string());

    Json(json!({
        "id": body.id,
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "payload": STANDARD.encode(&reply),
        "statusCode": 200,
        "message": "Success",
        "metadata": metadata,
        "processingTimeNs": start.elapsed().as_nanos() as i64,
    }))
    .into_response()
}
