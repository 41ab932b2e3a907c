//! Application state shared across handlers.

use spool_core::config::AppConfig;
use spool_engine::UploadEngine;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// The upload engine and, through it, the backing stores.
    pub engine: UploadEngine,
}

impl AppState {
    pub fn new(config: AppConfig, engine: UploadEngine) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }

    /// Request body limit for chunk uploads.
    pub fn max_chunk_size(&self) -> usize {
        usize::try_from(self.config.server.max_chunk_size).unwrap_or(usize::MAX)
    }
}
