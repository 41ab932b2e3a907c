//! In-process presence tracker.

use crate::error::PresenceResult;
use crate::traits::PresenceTracker;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use spool_core::UploadId;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Upper bound on a set's lifetime, so the expiry instant cannot overflow.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug)]
struct PresenceSet {
    indices: BTreeSet<u64>,
    expires_at: Instant,
}

impl PresenceSet {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Presence tracker held in process memory.
///
/// Sets are sharded by upload, so chunks of different uploads never contend.
/// Expired sets read as empty immediately and are removed by
/// [`MemoryPresence::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryPresence {
    sets: DashMap<UploadId, PresenceSet>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired set, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sets.len();
        self.sets.retain(|_, set| !set.is_expired(now));
        before.saturating_sub(self.sets.len())
    }

    /// Number of uploads with a live or not yet purged set.
    pub fn tracked_uploads(&self) -> usize {
        self.sets.len()
    }

    /// Spawn a task that purges expired sets every `interval`.
    /// The task ends once the tracker is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let tracker: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(tracker) = tracker.upgrade() else {
                    break;
                };
                let purged = tracker.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "presence sweeper removed expired sets");
                }
            }
        })
    }
}

#[async_trait]
impl PresenceTracker for MemoryPresence {
    async fn add(&self, upload_id: &UploadId, index: u64, ttl: Duration) -> PresenceResult<()> {
        let now = Instant::now();
        let expires_at = now + ttl.min(MAX_TTL);
        match self.sets.entry(*upload_id) {
            Entry::Occupied(mut entry) => {
                let set = entry.get_mut();
                if set.is_expired(now) {
                    set.indices.clear();
                }
                set.indices.insert(index);
                set.expires_at = expires_at;
            }
            Entry::Vacant(entry) => {
                entry.insert(PresenceSet {
                    indices: BTreeSet::from([index]),
                    expires_at,
                });
            }
        }
        Ok(())
    }

    async fn list(&self, upload_id: &UploadId) -> PresenceResult<BTreeSet<u64>> {
        let now = Instant::now();
        Ok(self
            .sets
            .get(upload_id)
            .filter(|set| !set.is_expired(now))
            .map(|set| set.indices.clone())
            .unwrap_or_default())
    }

    async fn contains(&self, upload_id: &UploadId, index: u64) -> PresenceResult<bool> {
        let now = Instant::now();
        Ok(self
            .sets
            .get(upload_id)
            .is_some_and(|set| !set.is_expired(now) && set.indices.contains(&index)))
    }

    async fn clear(&self, upload_id: &UploadId) -> PresenceResult<()> {
        self.sets.remove(upload_id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
