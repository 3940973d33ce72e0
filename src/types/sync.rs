//! Reports produced by the remote reconciler.

use serde::{Deserialize, Serialize};

/// Result of one `Reconciler::sync` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub local_records: u64,
    pub remote_before: u64,
    /// Size of the diff at diff time.
    pub missing: u64,
    pub inserted: u64,
    /// Rejected by the remote unique index; already present.
    pub already_present: u64,
    pub failed: u64,
    pub failed_ids: Vec<String>,
    pub batches: u64,
}

impl SyncReport {
    /// Every missing record is now present remotely.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Two-way id comparison between the dataset and the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub local_records: u64,
    pub remote_records: u64,
    pub local_only: u64,
    pub remote_only: u64,
}

impl ConsistencyReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.local_only == 0 && self.remote_only == 0
    }
}
