//! Transport drivers.
//!
//! A driver issues one request against the echo upstream and reports a
//! normalized [`RequestOutcome`]. Per-request failures are always returned as
//! failed outcomes; only driver construction can fail with [`DriverError`].
//!
//! Drivers are created per test run through a [`TransportFactory`], so a
//! driver's channel or connection pool is never shared across protocols or
//! across concurrent test runs.

pub mod grpc;
pub mod http;
pub mod proto;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DriverError;
use crate::models::{PayloadMode, Protocol, RequestOutcome, TestConfiguration};

pub use grpc::GrpcDriver;
pub use http::HttpDriver;

/// Parameters of a single request
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub id: String,
    pub payload: Bytes,
    pub response_size: usize,
    pub payload_mode: PayloadMode,
}

/// A protocol adapter safe for concurrent use by every in-flight request of a run
#[async_trait]
pub trait Transport: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Send one request and wait for the full response, error or timeout
    async fn send_one(&self, request: RequestSpec) -> RequestOutcome;

    /// Whether [`Transport::send_stream`] opens a real stream
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Send every request over one stream and wait for all responses.
    ///
    /// The default sends them one after another.
    async fn send_stream(&self, requests: Vec<RequestSpec>) -> Vec<RequestOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(self.send_one(request).await);
        }
        outcomes
    }
}

/// Builds driver instances for a test run
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, protocol: Protocol) -> Result<Arc<dyn Transport>, DriverError>;
}

/// Settings shared by both production drivers
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub grpc_url: String,
    pub http_url: String,
    pub http_max_sockets: usize,
    pub connect_timeout: Duration,
    pub min_request_timeout: Duration,
    pub timeout_ms_per_byte: f64,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            grpc_url: "http://127.0.0.1:9090".to_string(),
            http_url: "http://127.0.0.1:8080".to_string(),
            http_max_sockets: 50,
            connect_timeout: Duration::from_secs(10),
            min_request_timeout: Duration::from_millis(120_000),
            timeout_ms_per_byte: 0.01,
        }
    }
}

impl DriverSettings {
    /// Per-request deadline: `max(min_request_timeout, payload_bytes * timeout_ms_per_byte)`
    pub fn request_timeout(&self, payload_bytes: usize) -> Duration {
        let scaled_ms = payload_bytes as f64 * self.timeout_ms_per_byte;
        let scaled = if scaled_ms.is_finite() && scaled_ms > 0.0 {
            Duration::from_secs_f64(scaled_ms / 1000.0)
        } else {
            Duration::ZERO
        };
        self.min_request_timeout.max(scaled)
    }
}

/// Production factory: selects the driver for a protocol from a fixed table
pub struct UpstreamConnector {
    settings: DriverSettings,
}

impl UpstreamConnector {
    pub fn new(settings: DriverSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl TransportFactory for UpstreamConnector {
    async fn connect(&self, protocol: Protocol) -> Result<Arc<dyn Transport>, DriverError> {
        match protocol {
            Protocol::BinaryRpc => Ok(Arc::new(GrpcDriver::connect(self.settings.clone()).await?)),
            Protocol::Http => Ok(Arc::new(HttpDriver::new(self.settings.clone())?)),
        }
    }
}

/// Request metadata shared by both drivers
pub(crate) fn request_metadata(
    request: &RequestSpec,
) -> std::collections::HashMap<String, String> {
    let mut metadata = std::collections::HashMap::new();
    if request.response_size > 0 {
        metadata.insert(
            "expectedResponseSize".to_string(),
            request.response_size.to_string(),
        );
    }
    if request.payload_mode == PayloadMode::Structured {
        metadata.insert("contentType".to_string(), "application/json".to_string());
    }
    metadata
}

/// Build the request list for a run; every request shares the same payload buffer
pub fn request_specs(
    config: &TestConfiguration,
    payload: &Bytes,
    prefix: &str,
) -> impl Fn(usize) -> RequestSpec {
    let payload = payload.clone();
    let response_size = config.response_size;
    let payload_mode = config.payload_mode;
    let prefix = prefix.to_string();
    move |index| RequestSpec {
        id: format!("{}-{}", prefix, index),
        payload: payload.clone(),
        response_size,
        payload_mode,
    }
}

/// Milliseconds elapsed since `start` as a float
pub(crate) fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timeout_has_floor() {
        let settings = DriverSettings::default();
        assert_eq!(settings.request_timeout(0), Duration::from_millis(120_000));
        assert_eq!(settings.request_timeout(1024), Duration::from_millis(120_000));
    }

    #[test]
    fn test_request_timeout_scales_with_payload() {
        let settings = DriverSettings::default();
        // 100 MB * 0.01 ms/byte = 1_048_576 ms
        let timeout = settings.request_timeout(100 * 1024 * 1024);
        assert_eq!(timeout.as_millis(), 1_048_576);
    }

    #[test]
    fn test_request_metadata() {
        let spec = RequestSpec {
            id: "a".to_string(),
            payload: Bytes::new(),
            response_size: 2048,
            payload_mode: PayloadMode::Structured,
        };
        let metadata = request_metadata(&spec);
        assert_eq!(metadata["expectedResponseSize"], "2048");
        assert_eq!(metadata["contentType"], "application/json");

        let spec = RequestSpec {
            response_size: 0,
            payload_mode: PayloadMode::Binary,
            ..spec
        };
        assert!(request_metadata(&spec).is_empty());
    }

    #[test]
    fn test_request_specs_share_payload() {
        let config = TestConfiguration::default();
        let payload = Bytes::from(vec![7u8; 32]);
        let make = request_specs(&config, &payload, "perf-test");

        let first = make(0);
        let second = make(1);
        assert_eq!(first.id, "perf-test-0");
        assert_eq!(second.id, "perf-test-1");
        assert_eq!(first.payload.as_ptr(), second.payload.as_ptr());
    }
}
