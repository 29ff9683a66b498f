use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;

use super::{elapsed_ms, request_metadata, DriverSettings, RequestSpec, Transport};
use crate::error::DriverError;
use crate::models::{Protocol, RequestOutcome};

/// Path of the echo endpoint on the upstream
pub const PROCESS_PATH: &str = "/api/v1/performance/process";

/// Request body; the payload travels base64 encoded
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EchoRequest<'a> {
    id: &'a str,
    timestamp: i64,
    payload: &'a str,
    metadata: HashMap<String, String>,
}

/// Scalar part of the response; the payload is read but not kept
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EchoResponse {
    #[serde(default)]
    status_code: Option<i32>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    processing_time_ns: Option<i64>,
}

/// Encoded form of the payload buffer most recently seen
struct EncodedPayload {
    source: Bytes,
    encoded: Arc<str>,
}

/// HTTP driver with a socket-bounded connection pool
pub struct HttpDriver {
    /// Shared HTTP client with connection pooling
    client: reqwest::Client,

    /// Full URL of the echo endpoint
    url: String,

    /// Caps concurrent sockets at `http_max_sockets`
    sockets: Semaphore,

    /// Runs reuse one payload buffer, so it is encoded once
    encoded: Mutex<Option<EncodedPayload>>,

    settings: DriverSettings,
}

impl HttpDriver {
    /// Create a new HTTP driver
    pub fn new(settings: DriverSettings) -> Result<Self, DriverError> {
        let base = settings.http_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base).map_err(|e| DriverError::InvalidEndpoint {
            protocol: Protocol::Http,
            url: settings.http_url.clone(),
            message: e.to_string(),
        })?;

        let max_sockets = settings.http_max_sockets.max(1);
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(max_sockets)
            .connect_timeout(settings.connect_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| DriverError::ClientBuild {
                protocol: Protocol::Http,
                message: e.to_string(),
            })?;

        tracing::info!(url = %base, max_sockets, "HTTP client initialized with connection pooling");

        Ok(Self {
            client,
            url: format!("{}{}", base, PROCESS_PATH),
            sockets: Semaphore::new(max_sockets),
            encoded: Mutex::new(None),
            settings,
        })
    }

    /// Base64 form of `payload`, computed once per distinct buffer
    fn encode_payload(&self, payload: &Bytes) -> Arc<str> {
        let Ok(mut cache) = self.encoded.lock() else {
            return Arc::from(base64::engine::general_purpose::STANDARD.encode(payload));
        };

        if let Some(cached) = cache.as_ref() {
            if cached.source.as_ptr() == payload.as_ptr() && cached.source.len() == payload.len() {
                return cached.encoded.clone();
            }
        }

        let encoded: Arc<str> = Arc::from(base64::engine::general_purpose::STANDARD.encode(payload));
        *cache = Some(EncodedPayload {
            source: payload.clone(),
            encoded: encoded.clone(),
        });
        encoded
    }

    async fn execute(&self, request: &RequestSpec, body: Vec<u8>) -> Result<EchoResponse, String> {
        let timeout = self.settings.request_timeout(request.payload.len());

        let response = self
            .client
            .post(&self.url)
            .query(&[("responseSize", request.response_size)])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(describe_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), text));
        }

        let bytes = response.bytes().await.map_err(describe_error)?;
        serde_json::from_slice::<EchoResponse>(&bytes)
            .map_err(|e| format!("Invalid response body: {}", e))
    }
}

/// Categorize a reqwest error for the outcome message
fn describe_error(e: reqwest::Error) -> String {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    };
    format!("HTTP request failed: {} (kind: {})", e, kind)
}

#[async_trait]
impl Transport for HttpDriver {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    async fn send_one(&self, request: RequestSpec) -> RequestOutcome {
        let encoded = self.encode_payload(&request.payload);
        let body = serde_json::to_vec(&EchoRequest {
            id: &request.id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload: &encoded,
            metadata: request_metadata(&request),
        });
        let body = match body {
            Ok(body) => body,
            Err(e) => return RequestOutcome::failure(format!("Failed to encode request: {}", e)),
        };

        let Ok(_permit) = self.sockets.acquire().await else {
            return RequestOutcome::failure("HTTP connection pool closed");
        };

        let start = Instant::now();
        match self.execute(&request, body).await {
            Ok(response) => {
                let latency = elapsed_ms(start);
                match response.status_code {
                    Some(code) if !(200..300).contains(&code) => RequestOutcome::failure(format!(
                        "upstream status {}: {}",
                        code,
                        response.message.unwrap_or_default()
                    )),
                    _ => RequestOutcome::success(latency, response.processing_time_ns),
                }
            }
            Err(message) => {
                tracing::debug!(request_id = %request.id, error = %message, "HTTP request failed");
                RequestOutcome::failure(message)
            }
        }
    }
}
