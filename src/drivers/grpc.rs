use async_trait::async_trait;
use std::time::{Duration, Instant};
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use super::proto::{
    DataRequest, DataResponse, PROCESS_DATA_PATH, PROCESS_DATA_STREAM_PATH, SERVICE_NAME,
};
use super::{elapsed_ms, request_metadata, DriverSettings, RequestSpec, Transport};
use crate::error::DriverError;
use crate::models::{Protocol, RequestOutcome};

/// Largest message accepted in either direction (200 MB)
const MAX_MESSAGE_SIZE: usize = 200 * 1024 * 1024;

/// Binary-RPC driver over a single multiplexed gRPC channel
pub struct GrpcDriver {
    /// Long-lived HTTP/2 channel shared by every call of a run
    channel: Channel,

    settings: DriverSettings,
}

/// Scalar fields kept from a streamed response
struct StreamReply {
    status_code: i32,
    message: String,
    processing_time_ns: i64,
}

impl GrpcDriver {
    /// Establish the channel eagerly so an unreachable upstream fails here
    pub async fn connect(settings: DriverSettings) -> Result<Self, DriverError> {
        let url = settings.grpc_url.clone();

        let endpoint = Endpoint::from_shared(url.clone())
            .map_err(|e| DriverError::InvalidEndpoint {
                protocol: Protocol::BinaryRpc,
                url: url.clone(),
                message: e.to_string(),
            })?
            .connect_timeout(settings.connect_timeout)
            .http2_keep_alive_interval(Duration::from_secs(30))
            .keep_alive_timeout(Duration::from_secs(5))
            .keep_alive_while_idle(true)
            .tcp_nodelay(true);

        let channel = endpoint.connect().await.map_err(|e| DriverError::Connect {
            protocol: Protocol::BinaryRpc,
            url: url.clone(),
            message: e.to_string(),
        })?;

        tracing::info!(url = %url, service = SERVICE_NAME, "gRPC channel established");

        Ok(Self { channel, settings })
    }

    fn client(&self) -> Grpc<Channel> {
        Grpc::new(self.channel.clone())
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE)
    }

    async fn unary(
        &self,
        message: DataRequest,
        timeout: Duration,
    ) -> Result<DataResponse, tonic::Status> {
        let mut grpc = self.client();
        grpc.ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {}", e)))?;

        let mut request = tonic::Request::new(message);
        request.set_timeout(timeout);

        let codec: ProstCodec<DataRequest, DataResponse> = ProstCodec::default();
        let response = grpc
            .unary(request, PathAndQuery::from_static(PROCESS_DATA_PATH), codec)
            .await?;

        Ok(response.into_inner())
    }

    /// Open one bidirectional stream, write every message, read until `expected` replies
    async fn collect_stream(
        &self,
        messages: Vec<DataRequest>,
        expected: usize,
        replies: &mut Vec<StreamReply>,
    ) -> Result<(), tonic::Status> {
        let mut grpc = self.client();
        grpc.ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {}", e)))?;

        let codec: ProstCodec<DataRequest, DataResponse> = ProstCodec::default();
        let outbound = futures::stream::iter(messages);
        let mut inbound = grpc
            .streaming(
                tonic::Request::new(outbound),
                PathAndQuery::from_static(PROCESS_DATA_STREAM_PATH),
                codec,
            )
            .await?
            .into_inner();

        while replies.len() < expected {
            match inbound.message().await? {
                Some(response) => replies.push(StreamReply {
                    status_code: response.status_code,
                    message: response.message,
                    processing_time_ns: response.processing_time_ns,
                }),
                None => break,
            }
        }

        Ok(())
    }
}

fn to_message(request: RequestSpec) -> DataRequest {
    let metadata = request_metadata(&request);
    DataRequest {
        id: request.id,
        timestamp: chrono::Utc::now().timestamp_millis(),
        payload: request.payload,
        metadata,
    }
}

fn is_success_status(status_code: i32) -> bool {
    (200..300).contains(&status_code)
}

#[async_trait]
impl Transport for GrpcDriver {
    fn protocol(&self) -> Protocol {
        Protocol::BinaryRpc
    }

    async fn send_one(&self, request: RequestSpec) -> RequestOutcome {
        let timeout = self.settings.request_timeout(request.payload.len());
        let id = request.id.clone();
        let message = to_message(request);

        let start = Instant::now();
        match tokio::time::timeout(timeout, self.unary(message, timeout)).await {
            Ok(Ok(response)) if is_success_status(response.status_code) => {
                RequestOutcome::success(elapsed_ms(start), Some(response.processing_time_ns))
            }
            Ok(Ok(response)) => RequestOutcome::failure(format!(
                "upstream status {}: {}",
                response.status_code, response.message
            )),
            Ok(Err(status)) => {
                tracing::debug!(
                    request_id = %id,
                    code = ?status.code(),
                    error = %status.message(),
                    "gRPC call failed"
                );
                RequestOutcome::failure(format!("gRPC {:?}: {}", status.code(), status.message()))
            }
            Err(_) => RequestOutcome::failure(format!(
                "request timed out after {}ms",
                timeout.as_millis()
            )),
        }
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    /// Per-message timing is not observable on a shared stream, so every
    /// received response is assigned `stream duration / responses received`.
    async fn send_stream(&self, requests: Vec<RequestSpec>) -> Vec<RequestOutcome> {
        let expected = requests.len();
        if expected == 0 {
            return Vec::new();
        }

        let total_payload: usize = requests.iter().map(|r| r.payload.len()).sum();
        let timeout = self.settings.request_timeout(total_payload);
        let messages: Vec<DataRequest> = requests.into_iter().map(to_message).collect();

        let mut replies = Vec::with_capacity(expected);
        let start = Instant::now();
        let result =
            tokio::time::timeout(timeout, self.collect_stream(messages, expected, &mut replies))
                .await;
        let duration_ms = elapsed_ms(start);

        let stream_error = match result {
            Ok(Ok(())) => None,
            Ok(Err(status)) => Some(format!("gRPC stream {:?}: {}", status.code(), status.message())),
            Err(_) => Some(format!("stream timed out after {}ms", timeout.as_millis())),
        };

        let received = replies.len();
        tracing::debug!(
            expected,
            received,
            duration_ms,
            error = ?stream_error,
            "gRPC stream finished"
        );

        let per_message_ms = if received > 0 {
            duration_ms / received as f64
        } else {
            0.0
        };

        let mut outcomes: Vec<RequestOutcome> = replies
            .into_iter()
            .map(|reply| {
                if is_success_status(reply.status_code) {
                    RequestOutcome::success(per_message_ms, Some(reply.processing_time_ns))
                } else {
                    RequestOutcome::failure(format!(
                        "upstream status {}: {}",
                        reply.status_code, reply.message
                    ))
                }
            })
            .collect();

        let reason =
            stream_error.unwrap_or_else(|| "stream closed before all responses arrived".to_string());
        outcomes.extend((received..expected).map(|_| RequestOutcome::failure(reason.clone())));
        outcomes
    }
}
