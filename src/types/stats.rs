//! Counters reported by merges, runs and dataset inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of merging one batch of candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub accepted: u64,
    pub rejected_duplicates: u64,
}

impl MergeResult {
    #[must_use]
    pub fn candidates(&self) -> u64 {
        self.accepted + self.rejected_duplicates
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderCount {
    pub sender: String,
    pub count: u64,
}

/// Summary of the persisted dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_records: u64,
    /// `None` when no record carries a timestamp.
    pub date_range: Option<DateRange>,
    /// Most frequent senders, highest count first, ties broken by sender.
    pub top_senders: Vec<SenderCount>,
}
