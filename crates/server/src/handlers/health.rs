//! Health endpoint.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: &'static str,
    pub presence: &'static str,
}

/// GET /v1/health - Health check.
///
/// Unauthenticated for load balancers and orchestrator probes. Touches every
/// backing store and answers 503 when one of them is unreachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let engine = &state.engine;

    engine
        .storage()
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("storage: {e}")))?;
    engine
        .metadata()
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("metadata: {e}")))?;
    engine
        .presence()
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("presence: {e}")))?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage: engine.storage().backend_name(),
        presence: engine.presence().backend_name(),
    }))
}
