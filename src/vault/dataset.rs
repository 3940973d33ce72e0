//! The persisted record collection and the read-side queries over it.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::constants::{DATASET_FILE, DATASET_FORMAT, TOP_SENDERS};
use crate::error::Result;
use crate::io::envelope;
use crate::types::{DatasetStats, DateRange, Record, SenderCount};

/// Records in insertion order. Uniqueness of ids is enforced by the merger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Load and verify a dataset file. A missing file is an empty dataset.
    pub fn load(path: &Path) -> Result<Self> {
        let records: Option<Vec<Record>> = envelope::read(path, DATASET_FORMAT)?;
        let dataset = Self::new(records.unwrap_or_default());
        tracing::debug!(path = %path.display(), records = dataset.len(), "dataset loaded");
        Ok(dataset)
    }

    /// Load `dataset.json` from a data directory without taking the vault lock.
    ///
    /// Safe while ingestion runs: the file is only ever replaced whole.
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        Self::load(&data_dir.join(DATASET_FILE))
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        envelope::encode(DATASET_FORMAT, Some(self.len() as u64), &self.records)
    }

    pub(crate) fn extend(&mut self, records: Vec<Record>) {
        self.records.extend(records);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.id.as_str())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|record| record.id == id)
    }

    #[must_use]
    pub fn latest_received_at(&self) -> Option<DateTime<Utc>> {
        self.records.iter().filter_map(|record| record.received_at).max()
    }

    /// Records received within `[start, end]`, in dataset order.
    #[must_use]
    pub fn in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|record| {
                record
                    .received_at
                    .is_some_and(|at| at >= start && at <= end)
            })
            .collect()
    }

    /// Newest first; undated records trail in dataset order.
    #[must_use]
    pub fn newest_first(&self) -> Vec<&Record> {
        let mut sorted: Vec<&Record> = self.records.iter().collect();
        sorted.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        sorted
    }

    #[must_use]
    pub fn stats(&self) -> DatasetStats {
        let mut earliest: Option<DateTime<Utc>> = None;
        let mut latest: Option<DateTime<Utc>> = None;
        let mut senders: HashMap<&str, u64> = HashMap::new();

        for record in &self.records {
            if let Some(at) = record.received_at {
                earliest = Some(earliest.map_or(at, |current| current.min(at)));
                latest = Some(latest.map_or(at, |current| current.max(at)));
            }
            if !record.sender.is_empty() {
                *senders.entry(record.sender.as_str()).or_default() += 1;
            }
        }

        let mut top_senders: Vec<SenderCount> = senders
            .into_iter()
            .map(|(sender, count)| SenderCount {
                sender: sender.to_string(),
                count,
            })
            .collect();
        top_senders.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sender.cmp(&b.sender)));
        top_senders.truncate(TOP_SENDERS);

        DatasetStats {
            total_records: self.len() as u64,
            date_range: earliest
                .zip(latest)
                .map(|(earliest, latest)| DateRange { earliest, latest }),
            top_senders,
        }
    }
}
