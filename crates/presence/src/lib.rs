//! Chunk presence tracking for spool.
//!
//! Answers "which chunks of this upload have arrived" quickly, with entries
//! that expire on their own when an upload is abandoned.

pub mod error;
pub mod memory;
pub mod redis_backend;
pub mod traits;

pub use error::{PresenceError, PresenceResult};
pub use memory::MemoryPresence;
pub use redis_backend::RedisPresence;
pub use traits::PresenceTracker;

use spool_core::config::PresenceConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a presence tracker from configuration.
///
/// The in-memory tracker gets a background sweeper that purges expired sets;
/// it stops when the tracker is dropped.
pub async fn from_config(config: &PresenceConfig) -> PresenceResult<Arc<dyn PresenceTracker>> {
    config.validate().map_err(PresenceError::Config)?;

    match config {
        PresenceConfig::Memory {
            sweep_interval_secs,
        } => {
            let tracker = Arc::new(MemoryPresence::new());
            tracker.spawn_sweeper(Duration::from_secs(*sweep_interval_secs));
            Ok(tracker)
        }
        PresenceConfig::Redis { url, key_prefix } => {
            let tracker = RedisPresence::connect(url, key_prefix.clone()).await?;
            Ok(Arc::new(tracker))
        }
    }
}
