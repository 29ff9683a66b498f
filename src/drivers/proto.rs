// Protobuf messages for the echo service
// Hand-written prost definitions of performance.PerformanceTestService

use std::collections::HashMap;

/// Fully qualified gRPC service name
pub const SERVICE_NAME: &str = "performance.PerformanceTestService";

/// Unary call path
pub const PROCESS_DATA_PATH: &str = "/performance.PerformanceTestService/ProcessData";

/// Bidirectional stream call path
pub const PROCESS_DATA_STREAM_PATH: &str = "/performance.PerformanceTestService/ProcessDataStream";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
    #[prost(bytes = "bytes", tag = "3")]
    pub payload: ::prost::bytes::Bytes,
    #[prost(map = "string, string", tag = "4")]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataResponse {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
    #[prost(bytes = "bytes", tag = "3")]
    pub payload: ::prost::bytes::Bytes,
    #[prost(int32, tag = "4")]
    pub status_code: i32,
    #[prost(string, tag = "5")]
    pub message: String,
    #[prost(map = "string, string", tag = "6")]
    pub metadata: HashMap<String, String>,
    #[prost(int64, tag = "7")]
    pub processing_time_ns: i64,
}
