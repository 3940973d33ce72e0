//! Durable ingestion progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress marker written after every merged batch.
///
/// The cursor is opaque to the vault; it is handed back to the record source verbatim
/// when a run resumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Cursor to resume fetching from; `None` is the source's natural origin.
    pub last_cursor: Option<String>,
    /// Candidates consumed so far (accepted, duplicate and filtered).
    pub processed_count: u64,
    pub accepted_count: u64,
    pub batches: u64,
    /// Records in the dataset file when this checkpoint was written.
    pub dataset_len: u64,
    /// Time of the newest snapshot of any kind.
    #[serde(default)]
    pub last_backup_at: Option<DateTime<Utc>>,
    /// Time of the newest snapshot not taken ahead of a merge; the backup interval
    /// is measured from here.
    #[serde(default)]
    pub last_periodic_backup_at: Option<DateTime<Utc>>,
    /// Consecutive candidates older than the cutoff at the end of the last batch.
    #[serde(default)]
    pub stale_streak: u32,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// The checkpoint a fresh vault starts from.
    #[must_use]
    pub fn origin(now: DateTime<Utc>) -> Self {
        Self {
            last_cursor: None,
            processed_count: 0,
            accepted_count: 0,
            batches: 0,
            dataset_len: 0,
            last_backup_at: None,
            last_periodic_backup_at: None,
            stale_streak: 0,
            timestamp: now,
        }
    }

    /// Successor checkpoint after one merged batch.
    #[must_use]
    pub fn advance(&self, progress: &BatchProgress, accepted: u64, dataset_len: u64) -> Self {
        Self {
            last_cursor: progress.next_cursor.clone(),
            processed_count: self.processed_count.saturating_add(progress.consumed),
            accepted_count: self.accepted_count.saturating_add(accepted),
            batches: self.batches.saturating_add(1),
            dataset_len,
            last_backup_at: self.last_backup_at,
            last_periodic_backup_at: self.last_periodic_backup_at,
            stale_streak: progress.stale_streak,
            timestamp: progress.at,
        }
    }
}

/// What the orchestrator knows about a batch when it hands it to the merger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    /// Cursor the batch was fetched from (for log context).
    pub cursor: Option<String>,
    /// Cursor to persist once the batch is durable.
    pub next_cursor: Option<String>,
    /// Candidates pulled from the source, including those filtered before merge.
    pub consumed: u64,
    /// Cutoff streak after screening this batch.
    pub stale_streak: u32,
    pub at: DateTime<Utc>,
}
