// Data model for performance test runs
// Inputs, per-request outcomes, per-protocol results and the test record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Transport protocol under test
///
/// Variant order is the fixed execution order of a comparison run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Protocol {
    #[serde(alias = "grpc", alias = "binary-rpc")]
    BinaryRpc,
    Http,
}

impl Protocol {
    /// All protocols in execution order
    pub const ALL: [Protocol; 2] = [Protocol::BinaryRpc, Protocol::Http];

    /// Wire name used in output records
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::BinaryRpc => "binaryRpc",
            Protocol::Http => "http",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binaryrpc" | "binary-rpc" | "grpc" => Ok(Protocol::BinaryRpc),
            "http" => Ok(Protocol::Http),
            _ => Err(format!("Unknown protocol: {}", s)),
        }
    }
}

/// Shape of generated request bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadMode {
    /// Sequential byte pattern with sparse random bytes
    #[default]
    Binary,
    /// Padded JSON document
    Structured,
}

impl std::str::FromStr for PayloadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binary" => Ok(PayloadMode::Binary),
            "structured" | "json" => Ok(PayloadMode::Structured),
            _ => Err(format!("Unknown payload mode: {}", s)),
        }
    }
}

/// Parameters of one comparison run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfiguration {
    pub num_requests: usize,
    pub concurrency: usize,
    pub request_size: usize,
    pub response_size: usize,
    pub protocols: BTreeSet<Protocol>,
    #[serde(default)]
    pub use_streaming: bool,
    #[serde(default)]
    pub test_name: String,
    #[serde(default)]
    pub payload_mode: PayloadMode,
    #[serde(default)]
    pub warmup_requests: usize,
}

impl Default for TestConfiguration {
    fn default() -> Self {
        Self {
            num_requests: 100,
            concurrency: 10,
            request_size: 1024,
            response_size: 1024,
            protocols: Protocol::ALL.into_iter().collect(),
            use_streaming: false,
            test_name: "comparison".to_string(),
            payload_mode: PayloadMode::Binary,
            warmup_requests: 0,
        }
    }
}

/// Result of a single request. Aggregated immediately, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub success: bool,
    pub client_latency_ms: Option<f64>,
    pub server_processing_time_ns: Option<i64>,
    pub error_message: Option<String>,
}

impl RequestOutcome {
    /// A completed request
    pub fn success(latency_ms: f64, server_processing_time_ns: Option<i64>) -> Self {
        Self {
            success: true,
            client_latency_ms: Some(latency_ms),
            server_processing_time_ns,
            error_message: None,
        }
    }

    /// A failed request; carries no latency
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            client_latency_ms: None,
            server_processing_time_ns: None,
            error_message: Some(message.into()),
        }
    }
}

/// Aggregate metrics for one protocol within one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolResult {
    pub protocol: Protocol,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_server_processing_ms: Option<f64>,
    pub throughput_req_per_sec: f64,
    pub total_duration_ms: f64,
    /// Requests in flight; 1 for a stream run
    pub concurrency: usize,
    pub request_size: usize,
    pub response_size: usize,
    pub streaming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProtocolResult {
    /// Error entry for a protocol whose run could not be carried out
    pub fn failed(protocol: Protocol, config: &TestConfiguration, error: impl Into<String>) -> Self {
        Self {
            protocol,
            total_requests: config.num_requests as u64,
            successful_requests: 0,
            failed_requests: config.num_requests as u64,
            success_rate: 0.0,
            average_latency_ms: 0.0,
            average_server_processing_ms: None,
            throughput_req_per_sec: 0.0,
            total_duration_ms: 0.0,
            concurrency: config.concurrency,
            request_size: config.request_size,
            response_size: config.response_size,
            streaming: false,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One protocol's value relative to the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelativeMetric {
    pub value: f64,
    pub relative_to: Protocol,
    /// `None` when the baseline value is zero
    pub ratio: Option<f64>,
    /// `None` when the baseline value is zero
    pub improvement_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub fastest_protocol: Option<Protocol>,
    pub lowest_latency_protocol: Option<Protocol>,
    pub max_throughput: f64,
    pub min_latency: f64,
}

/// Relative metrics derived from the results of one test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMetrics {
    pub throughput_comparison: BTreeMap<Protocol, RelativeMetric>,
    pub latency_comparison: BTreeMap<Protocol, RelativeMetric>,
    pub summary: ComparisonSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl TestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestStatus::Running)
    }
}

/// Aggregate root for one comparison run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub test_id: Uuid,
    pub test_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TestStatus,
    pub config: TestConfiguration,
    pub results: BTreeMap<Protocol, ProtocolResult>,
    pub comparison: Option<ComparisonMetrics>,
    pub error: Option<String>,
}

impl TestRecord {
    /// Create a record in the `running` state
    pub fn new(config: TestConfiguration) -> Self {
        Self {
            test_id: Uuid::new_v4(),
            test_name: config.test_name.clone(),
            start_time: Utc::now(),
            end_time: None,
            status: TestStatus::Running,
            config,
            results: BTreeMap::new(),
            comparison: None,
            error: None,
        }
    }
}
