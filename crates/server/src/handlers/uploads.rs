//! Upload endpoints.
//!
//! Every handler resolves the upload through [`authorize`], so uploads that
//! belong to another owner look exactly like unknown ones.

use crate::error::{ApiError, ApiResult};
use crate::identity::{Owner, TraceId};
use crate::metrics::{
    BYTES_STAGED, CHUNK_RECEIVE_DURATION, CHUNKS_DUPLICATE, CHUNKS_STORED, FINISH_INCOMPLETE,
    MERGE_DURATION, UPLOADS_DELETED, UPLOADS_INITIALIZED, UPLOADS_MERGED,
};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use spool_core::{UploadId, UploadRecord};
use spool_engine::{ChunkAck, EngineError};
use std::time::Instant;
use time::format_description::well_known::Rfc3339;

/// Maximum request body size for create requests (64 KiB).
const MAX_CREATE_BODY_SIZE: usize = 64 * 1024;

/// Create upload request body.
#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    pub file_name: String,
    pub total_chunks: u64,
}

#[derive(Debug, Serialize)]
pub struct CreateUploadResponse {
    pub upload_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    pub total_chunks: u64,
}

#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub upload_id: String,
    pub chunk_index: u64,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReceivedChunksResponse {
    pub upload_id: String,
    pub received_chunks: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct FinishResponse {
    pub success: bool,
    pub upload_id: String,
    pub stored_path: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct UploadMetadataResponse {
    pub upload_id: String,
    pub file_name: String,
    pub total_chunks: u64,
    pub status: &'static str,
    pub size: u64,
    pub received_count: u64,
    pub received_chunks: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_upload_id(raw: &str) -> ApiResult<UploadId> {
    Ok(UploadId::parse(raw)?)
}

fn parse_chunk_index(raw: &str) -> ApiResult<u64> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid chunk index: {raw:?}")))
}

fn format_timestamp(ts: time::OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

/// Load an upload on behalf of `owner`. Uploads owned by someone else
/// answer `NotFound`.
async fn authorize(state: &AppState, owner: &Owner, upload_id: &UploadId) -> ApiResult<UploadRecord> {
    let record = state.engine.get_record(upload_id).await?;
    if record.owner_id != owner.as_str() {
        tracing::debug!(%upload_id, "upload belongs to another owner");
        return Err(ApiError::NotFound(format!("upload {upload_id}")));
    }
    Ok(record)
}

/// POST /v1/uploads - Start an upload.
pub async fn create_upload(
    State(state): State<AppState>,
    owner: Owner,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateUploadResponse>)> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_CREATE_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let body: CreateUploadRequest = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?;

    let max_total_chunks = state.config.server.max_total_chunks;
    if body.total_chunks > max_total_chunks {
        return Err(ApiError::BadRequest(format!(
            "total_chunks {} exceeds maximum {}",
            body.total_chunks, max_total_chunks
        )));
    }

    let upload_id = state
        .engine
        .init_upload(&body.file_name, body.total_chunks, owner.as_str())
        .await?;
    UPLOADS_INITIALIZED.inc();

    Ok((
        StatusCode::CREATED,
        Json(CreateUploadResponse {
            upload_id: upload_id.to_string(),
        }),
    ))
}

/// PUT /v1/uploads/{upload_id}/chunks/{chunk_index}?total_chunks=N - Stage one chunk.
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((upload_id, chunk_index)): Path<(String, String)>,
    query: Result<Query<ChunkQuery>, QueryRejection>,
    owner: Owner,
    req: Request,
) -> ApiResult<Json<ChunkResponse>> {
    let start_time = Instant::now();
    let upload_id = parse_upload_id(&upload_id)?;
    let chunk_index = parse_chunk_index(&chunk_index)?;

    let Query(ChunkQuery { total_chunks }) =
        query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    authorize(&state, &owner, &upload_id).await?;

    let max_chunk_size = state.max_chunk_size();
    // One extra byte lets us tell "exactly at the limit" from "over it".
    let payload = axum::body::to_bytes(req.into_body(), max_chunk_size.saturating_add(1))
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read chunk: {e}")))?;
    if payload.len() > max_chunk_size {
        return Err(ApiError::BadRequest(format!(
            "chunk exceeds maximum size of {max_chunk_size} bytes"
        )));
    }

    let size = payload.len() as u64;
    let ack = state
        .engine
        .receive_chunk(&upload_id, chunk_index, total_chunks, payload)
        .await?;

    match ack {
        ChunkAck::Stored => {
            CHUNKS_STORED.inc();
            BYTES_STAGED.inc_by(size);
        }
        ChunkAck::Duplicate => CHUNKS_DUPLICATE.inc(),
    }
    CHUNK_RECEIVE_DURATION.observe(start_time.elapsed().as_secs_f64());

    Ok(Json(ChunkResponse {
        upload_id: upload_id.to_string(),
        chunk_index,
        status: ack.as_str(),
    }))
}

/// GET /v1/uploads/{upload_id}/chunks - Indices received so far.
pub async fn list_chunks(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    owner: Owner,
) -> ApiResult<Json<ReceivedChunksResponse>> {
    let upload_id = parse_upload_id(&upload_id)?;
    authorize(&state, &owner, &upload_id).await?;

    let received = state.engine.list_received_chunks(&upload_id).await?;
    Ok(Json(ReceivedChunksResponse {
        upload_id: upload_id.to_string(),
        received_chunks: received.into_iter().collect(),
    }))
}

/// POST /v1/uploads/{upload_id}/finish - Merge into the final artifact.
pub async fn finish_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    owner: Owner,
    req: Request,
) -> ApiResult<Json<FinishResponse>> {
    let start_time = Instant::now();
    let trace_id = req.extensions().get::<TraceId>().cloned().unwrap_or_default();
    let upload_id = parse_upload_id(&upload_id)?;
    authorize(&state, &owner, &upload_id).await?;

    let finished = match state.engine.finish_upload(&upload_id).await {
        Ok(finished) => finished,
        Err(e @ EngineError::Incomplete { .. }) => {
            FINISH_INCOMPLETE.inc();
            tracing::info!(%upload_id, %trace_id, error = %e, "finish rejected");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    UPLOADS_MERGED.inc();
    MERGE_DURATION.observe(start_time.elapsed().as_secs_f64());

    Ok(Json(FinishResponse {
        success: true,
        upload_id: upload_id.to_string(),
        stored_path: finished.stored_path,
        size: finished.size,
    }))
}

/// GET /v1/uploads/{upload_id} - Record plus progress.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    owner: Owner,
) -> ApiResult<Json<UploadMetadataResponse>> {
    let upload_id = parse_upload_id(&upload_id)?;
    authorize(&state, &owner, &upload_id).await?;

    let summary = state.engine.get_metadata(&upload_id).await?;
    let received_count = summary.received_count();
    let record = summary.record;

    Ok(Json(UploadMetadataResponse {
        upload_id: record.upload_id.to_string(),
        file_name: record.file_name,
        total_chunks: record.total_chunks,
        status: record.status.as_str(),
        size: summary.size,
        received_count,
        received_chunks: summary.received.into_iter().collect(),
        stored_path: record.stored_path,
        created_at: format_timestamp(record.created_at),
        updated_at: format_timestamp(record.updated_at),
    }))
}

/// GET /v1/uploads/{upload_id}/content - Stream the final artifact.
pub async fn download_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    owner: Owner,
) -> ApiResult<Response> {
    let upload_id = parse_upload_id(&upload_id)?;
    authorize(&state, &owner, &upload_id).await?;

    let artifact = state.engine.open_artifact(&upload_id).await?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.record.file_name);

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, artifact.size.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(artifact.stream),
    )
        .into_response())
}

/// DELETE /v1/uploads/{upload_id} - Remove an upload and everything it owns.
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    owner: Owner,
) -> ApiResult<StatusCode> {
    let upload_id = parse_upload_id(&upload_id)?;
    authorize(&state, &owner, &upload_id).await?;

    state.engine.delete_upload(&upload_id).await?;
    UPLOADS_DELETED.inc();
    Ok(StatusCode::NO_CONTENT)
}
