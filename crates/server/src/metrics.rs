//! Prometheus metrics for the spool server.
//!
//! The engine itself stays metric-free; handlers record outcomes here.
//!
//! The `/metrics` endpoint is unauthenticated to allow scraping. Metrics
//! carry no owner IDs or file names, but they do expose aggregate usage, so
//! restrict the endpoint to scraper addresses at the network level.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use spool_core::UploadStatus;
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static UPLOADS_INITIALIZED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "spool_uploads_initialized_total",
        "Total number of uploads initialized",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_MERGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "spool_uploads_merged_total",
        "Total number of successful finish calls",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("spool_uploads_deleted_total", "Total number of uploads deleted")
        .expect("metric creation failed")
});

pub static FINISH_INCOMPLETE: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "spool_finish_incomplete_total",
        "Finish attempts rejected because chunks were missing",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("spool_chunks_stored_total", "Total number of chunks staged")
        .expect("metric creation failed")
});

pub static CHUNKS_DUPLICATE: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "spool_chunks_duplicate_total",
        "Chunks skipped because they were already staged",
    )
    .expect("metric creation failed")
});

pub static BYTES_STAGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "spool_bytes_staged_total",
        "Total payload bytes written to staging",
    )
    .expect("metric creation failed")
});

pub static MERGE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "spool_merge_duration_seconds",
            "Time taken by finish calls, including the merge",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static CHUNK_RECEIVE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "spool_chunk_receive_duration_seconds",
            "Time taken to stage a single chunk",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

pub static ACTIVE_UPLOADS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "spool_active_uploads",
        "Uploads still in progress, refreshed on every scrape",
    )
    .expect("metric creation failed")
});

pub static REQUEST_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("spool_request_errors_total", "Failed requests by error code"),
        &["code"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedders can call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: [Box<dyn prometheus::core::Collector>; 11] = [
            Box::new(UPLOADS_INITIALIZED.clone()),
            Box::new(UPLOADS_MERGED.clone()),
            Box::new(UPLOADS_DELETED.clone()),
            Box::new(FINISH_INCOMPLETE.clone()),
            Box::new(CHUNKS_STORED.clone()),
            Box::new(CHUNKS_DUPLICATE.clone()),
            Box::new(BYTES_STAGED.clone()),
            Box::new(MERGE_DURATION.clone()),
            Box::new(CHUNK_RECEIVE_DURATION.clone()),
            Box::new(ACTIVE_UPLOADS.clone()),
            Box::new(REQUEST_ERRORS.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    refresh_active_uploads(&state).await;

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Set the in-progress gauge from the metadata store. On failure the
/// previous value is kept.
async fn refresh_active_uploads(state: &AppState) {
    let counted = state
        .engine
        .metadata()
        .count_uploads_by_status(UploadStatus::InProgress.as_str())
        .await;
    match counted {
        Ok(count) => ACTIVE_UPLOADS.set(i64::try_from(count).unwrap_or(i64::MAX)),
        Err(e) => tracing::warn!(error = %e, "failed to count in-progress uploads"),
    }
}

/// Count a failed request by its error code.
pub fn record_request_error(code: &str) {
    REQUEST_ERRORS.with_label_values(&[code]).inc();
}
