//! The record source boundary and an in-memory implementation.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::error::Result;
use crate::types::Record;

/// One page of candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBatch {
    pub records: Vec<Record>,
    /// Where the next fetch starts; persisted in the checkpoint once this batch is durable.
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// Rate limited by the remote side; `retry_after` is its hint, if any.
    #[error("throttled by source (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    #[error("transient source failure: {0}")]
    Transient(String),

    #[error("fatal source failure: {0}")]
    Fatal(String),
}

impl SourceError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Anything that can page through mailbox messages.
///
/// `cursor == None` asks for the source's natural origin. Implementations must return
/// records newest-first when the cutoff option is used.
pub trait RecordSource {
    fn fetch_batch(
        &mut self,
        cursor: Option<&str>,
        max_count: usize,
    ) -> std::result::Result<SourceBatch, SourceError>;
}

impl<S: RecordSource + ?Sized> RecordSource for &mut S {
    fn fetch_batch(
        &mut self,
        cursor: Option<&str>,
        max_count: usize,
    ) -> std::result::Result<SourceBatch, SourceError> {
        (**self).fetch_batch(cursor, max_count)
    }
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn fetch_batch(
        &mut self,
        cursor: Option<&str>,
        max_count: usize,
    ) -> std::result::Result<SourceBatch, SourceError> {
        (**self).fetch_batch(cursor, max_count)
    }
}

/// Pages over a fixed list of records. The cursor is the decimal offset of the next page.
///
/// Scripted faults are returned, in order, before any page is served; this is how tests
/// drive the retry path.
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    records: Vec<Record>,
    faults: VecDeque<SourceError>,
    calls: usize,
}

impl MemoryRecordSource {
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            faults: VecDeque::new(),
            calls: 0,
        }
    }

    /// Replay a JSON array of records, such as an earlier export.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs_err::read(path.as_ref())?;
        let records: Vec<Record> = serde_json::from_slice(&bytes)?;
        Ok(Self::new(records))
    }

    #[must_use]
    pub fn with_fault(mut self, fault: SourceError) -> Self {
        self.faults.push_back(fault);
        self
    }

    pub fn push_fault(&mut self, fault: SourceError) {
        self.faults.push_back(fault);
    }

    /// Number of `fetch_batch` calls, faults included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for MemoryRecordSource {
    fn fetch_batch(
        &mut self,
        cursor: Option<&str>,
        max_count: usize,
    ) -> std::result::Result<SourceBatch, SourceError> {
        self.calls += 1;
        if let Some(fault) = self.faults.pop_front() {
            return Err(fault);
        }
        let start = match cursor {
            None => 0,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| SourceError::Fatal(format!("invalid cursor {raw:?}")))?,
        };
        if start > self.records.len() {
            return Err(SourceError::Fatal(format!(
                "cursor {start} is past the end ({})",
                self.records.len()
            )));
        }
        let end = start.saturating_add(max_count.max(1)).min(self.records.len());
        Ok(SourceBatch {
            records: self.records[start..end].to_vec(),
            next_cursor: Some(end.to_string()),
            has_more: end < self.records.len(),
        })
    }
}
