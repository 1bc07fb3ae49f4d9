//! API error responses.
//!
//! Every error leaves the server as
//! `{"error": {"type", "message", "status_code", "timestamp"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use orchestrator_core::OrchestratorError;
use serde_json::json;
use tracing::error;

/// Error returned by a handler
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Machine-readable error type
    pub error_type: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    /// Create an error
    pub fn new(status: StatusCode, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    /// 404 Not Found
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// 422 Unprocessable Entity
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_request", message)
    }

    /// 503 Service Unavailable
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
    }

    /// 500 Internal Server Error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::InvalidRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::NoHealthyAgents
            | OrchestratorError::NoSuitableAgent { .. }
            | OrchestratorError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::DeadlineExceeded { .. } | OrchestratorError::Timeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            OrchestratorError::Configuration { .. } | OrchestratorError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.error_type(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error_type = %self.error_type, message = %self.message, "Request failed");
        }
        let body = json!({
            "error": {
                "type": self.error_type,
                "message": self.message,
                "status_code": self.status.as_u16(),
                "timestamp": Utc::now().to_rfc3339(),
            }
        });
        (self.status, Json(body)).into_response()
    }
}
