//! API error responses.
//!
//! Every engine error maps to one HTTP status and a stable machine-readable
//! code; retryable errors carry a `retryable` flag in the details so clients
//! can back off and retry instead of surfacing a failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable code (INVALID_TILE, INSUFFICIENT_FUNDS, LOCK_TIMEOUT, ...).
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// An engine error tagged with the request it failed.
#[derive(Debug)]
pub struct ApiError {
    pub request_id: String,
    pub source: EngineError,
}

impl ApiError {
    pub fn new(request_id: String, source: EngineError) -> Self {
        Self { request_id, source }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.source {
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            EngineError::InvalidTile { .. } => (StatusCode::BAD_REQUEST, "INVALID_TILE"),
            EngineError::InsufficientFunds { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS")
            }
            EngineError::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            EngineError::LockTimeout { .. } => (StatusCode::SERVICE_UNAVAILABLE, "LOCK_TIMEOUT"),
            EngineError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match &self.source {
            EngineError::InsufficientFunds { balance, required } => Some(serde_json::json!({
                "balance": balance.to_string(),
                "required": required.to_string(),
            })),
            EngineError::LockTimeout { timeout_ms, .. } => Some(serde_json::json!({
                "retryable": true,
                "timeout_ms": timeout_ms,
            })),
            EngineError::Persistence(_) => Some(serde_json::json!({ "retryable": true })),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.request_id, self.source)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, error = %self.source, "request failed");
        }
        let details = self.details();

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message: self.source.to_string(),
                details,
            },
        });
        (status, body).into_response()
    }
}
