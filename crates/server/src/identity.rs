//! Request identity: trace IDs and the owner principal.
//!
//! Authentication happens upstream. An authenticating gateway forwards the
//! caller's principal in a configurable header (`x-spool-owner` by default);
//! this module only reads it.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Maximum length for owner IDs.
const MAX_OWNER_ID_LEN: usize = 256;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value, keeping printable
    /// ASCII only. Falls back to a fresh ID when nothing survives.
    pub fn from_client(value: &str) -> Self {
        // Limit by characters, not bytes, so multi-byte input cannot split.
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extract trace ID from the X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Attach a trace ID to every request and run it inside a span carrying it.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);

    next.run(req).instrument(span).await
}

/// The principal an upload belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate a raw header value.
    pub fn parse(value: &str) -> Result<Self, ApiError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ApiError::Unauthorized("owner header is empty".to_string()));
        }
        if value.len() > MAX_OWNER_ID_LEN {
            return Err(ApiError::BadRequest(format!(
                "owner id exceeds {MAX_OWNER_ID_LEN} bytes"
            )));
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(ApiError::BadRequest(
                "owner id contains control characters".to_string(),
            ));
        }
        Ok(Self(value.to_string()))
    }
}

impl FromRequestParts<AppState> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let header = state.config.server.owner_header.as_str();
        let value = parts
            .headers
            .get(header)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {header} header")))?
            .to_str()
            .map_err(|_| ApiError::BadRequest(format!("{header} header is not valid UTF-8")))?;
        Owner::parse(value)
    }
}
