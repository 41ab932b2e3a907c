//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use spool_engine::EngineError;

/// Most missing indices listed in an error body; `missing_count` carries
/// the full total.
pub const MAX_MISSING_LISTED: usize = 1000;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Lowest missing chunk indices, for incomplete uploads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u64>>,
    /// Total number of missing chunks, for incomplete uploads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_count: Option<usize>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("incomplete upload: missing {} chunks", .missing.len())]
    Incomplete { missing: Vec<u64> },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "invalid_argument",
            Self::Unauthorized(_) => "unauthorized",
            Self::Incomplete { .. } => "incomplete",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Incomplete { .. } => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidArgument(msg) => Self::BadRequest(msg),
            EngineError::NotFound(msg) => Self::NotFound(msg),
            EngineError::Incomplete { missing, .. } => Self::Incomplete { missing },
            EngineError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<spool_core::Error> for ApiError {
    fn from(e: spool_core::Error) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let code = self.code();
        crate::metrics::record_request_error(code);

        let message = self.to_string();
        let (missing, missing_count) = match self {
            Self::Incomplete { mut missing } => {
                let count = missing.len();
                missing.truncate(MAX_MISSING_LISTED);
                (Some(missing), Some(count))
            }
            _ => (None, None),
        };
        let body = ErrorResponse {
            code: code.to_string(),
            message,
            missing,
            missing_count,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
