//! Backend construction and startup checks.

use crate::state::AppState;
use anyhow::{Context, Result};
use spool_core::config::AppConfig;
use spool_engine::UploadEngine;

/// Build every backend named by `config`, verify each is reachable and wire
/// them into an [`AppState`].
///
/// Failing here keeps the server from reporting healthy while a backend is
/// misconfigured or down.
pub async fn build_state(config: AppConfig) -> Result<AppState> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let storage = spool_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "storage backend ready");

    let metadata = spool_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!("metadata store ready");

    let presence = spool_presence::from_config(&config.presence)
        .await
        .context("failed to initialize presence tracker")?;
    presence
        .health_check()
        .await
        .context("presence health check failed")?;
    tracing::info!(backend = presence.backend_name(), "presence tracker ready");

    let engine = UploadEngine::from_config(storage, metadata, presence, &config.engine)
        .context("failed to build upload engine")?;

    Ok(AppState::new(config, engine))
}
