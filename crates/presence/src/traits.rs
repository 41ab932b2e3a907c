//! Presence tracker trait.

use crate::error::PresenceResult;
use async_trait::async_trait;
use spool_core::UploadId;
use std::collections::BTreeSet;
use std::time::Duration;

/// Per-upload set of received chunk indices with a sliding expiry.
///
/// Presence is a cache of what has been staged, never the source of truth:
/// an expired or lost set only makes clients resend chunks.
#[async_trait]
pub trait PresenceTracker: Send + Sync + 'static {
    /// Record `index` as received and push the set's expiry to `ttl` from
    /// now. Adding an index twice is a no-op apart from the refresh.
    async fn add(&self, upload_id: &UploadId, index: u64, ttl: Duration) -> PresenceResult<()>;

    /// Indices currently recorded, ascending. Unknown or expired uploads
    /// yield an empty set.
    async fn list(&self, upload_id: &UploadId) -> PresenceResult<BTreeSet<u64>>;

    /// Whether `index` is currently recorded.
    async fn contains(&self, upload_id: &UploadId, index: u64) -> PresenceResult<bool>;

    /// Drop the whole set. Clearing an unknown upload succeeds.
    async fn clear(&self, upload_id: &UploadId) -> PresenceResult<()>;

    /// Static identifier for the backend type, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity.
    async fn health_check(&self) -> PresenceResult<()> {
        Ok(())
    }
}
