//! Per-upload merge leases.
//!
//! Merges and deletes of the same upload run one at a time inside a process.
//! Cross-process exclusion is not attempted; the merge itself tolerates a
//! concurrent finisher through the atomic rename and the idempotent
//! completion update.

use dashmap::DashMap;
use spool_core::UploadId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-upload locks. Entries exist only while held or awaited.
#[derive(Clone, Default)]
pub struct MergeLeases {
    locks: Arc<DashMap<UploadId, Arc<Mutex<()>>>>,
}

impl MergeLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `upload_id`.
    pub async fn acquire(&self, upload_id: UploadId) -> MergeLease {
        let lock = self
            .locks
            .entry(upload_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        MergeLease {
            upload_id,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Number of uploads with a held or awaited lease.
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive access to one upload; released on drop.
pub struct MergeLease {
    upload_id: UploadId,
    locks: Arc<DashMap<UploadId, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MergeLease {
    fn drop(&mut self) {
        // Release the mutex first so the strong count below only counts the
        // map entry and any waiters.
        self.guard.take();
        self.locks
            .remove_if(&self.upload_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
