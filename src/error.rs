// Error handling module
// Defines engine/driver error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Protocol;

/// Failures raised while building a transport driver.
///
/// Per-request failures never use this type; they become failed outcomes.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Target URL could not be parsed
    #[error("Invalid {protocol} endpoint '{url}': {message}")]
    InvalidEndpoint {
        protocol: Protocol,
        url: String,
        message: String,
    },

    /// Channel or connection pool could not be established
    #[error("Failed to connect {protocol} driver to {url}: {message}")]
    Connect {
        protocol: Protocol,
        url: String,
        message: String,
    },

    /// Client could not be constructed
    #[error("Failed to build {protocol} client: {message}")]
    ClientBuild { protocol: Protocol, message: String },
}

/// Errors surfaced by the orchestration engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unknown test id
    #[error("Test not found: {0}")]
    NotFound(Uuid),

    /// Driver initialization failed
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// API errors that can occur during request processing
#[derive(Error, Debug)]
pub enum ApiError {
    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(id) => ApiError::NotFound(format!("test {}", id)),
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
