//! Error types for lessonpipe-api

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., incompatible duplicate trigger
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500); details stay in the logs
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<lessonpipe_common::Error> for ApiError {
    fn from(err: lessonpipe_common::Error) -> Self {
        use lessonpipe_common::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => {
                // Opaque to the caller; the correlation id ties the response
                // to the logged detail.
                let correlation_id = Uuid::new_v4();
                error!(correlation_id = %correlation_id, detail = %msg, "Internal error");
                let body = Json(json!({
                    "error": {
                        "code": "INTERNAL_ERROR",
                        "correlation_id": correlation_id.to_string(),
                    }
                }));
                return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
