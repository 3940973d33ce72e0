//! The remote document store boundary and an in-memory implementation.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::error::VaultError;
use crate::types::Record;

/// Per-record result of a bulk insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Rejected by the unique index on `id`: someone else stored it first.
    DuplicateRejected,
    Failed(String),
}

/// Whole-operation failure (transport, authentication, ...).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RemoteError(pub String);

impl From<RemoteError> for VaultError {
    fn from(err: RemoteError) -> Self {
        VaultError::Remote(err.0)
    }
}

/// Downstream database holding one document per record id.
///
/// `insert_many` is unordered: a rejected record does not stop the rest of the batch,
/// and the outcomes line up one-to-one with the input.
pub trait RemoteStore {
    fn ensure_index(&mut self, field: &str, unique: bool) -> Result<(), RemoteError>;
    fn existing_ids(&self) -> Result<HashSet<String>, RemoteError>;
    fn exists(&self, id: &str) -> Result<bool, RemoteError>;
    fn insert_many(&mut self, records: &[Record]) -> Result<Vec<InsertOutcome>, RemoteError>;
}

impl<R: RemoteStore + ?Sized> RemoteStore for Box<R> {
    fn ensure_index(&mut self, field: &str, unique: bool) -> Result<(), RemoteError> {
        (**self).ensure_index(field, unique)
    }

    fn existing_ids(&self) -> Result<HashSet<String>, RemoteError> {
        (**self).existing_ids()
    }

    fn exists(&self, id: &str) -> Result<bool, RemoteError> {
        (**self).exists(id)
    }

    fn insert_many(&mut self, records: &[Record]) -> Result<Vec<InsertOutcome>, RemoteError> {
        (**self).insert_many(records)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: Vec<Record>,
    ids: HashSet<String>,
    /// field -> unique
    indexes: BTreeMap<String, bool>,
    reject_ids: HashSet<String>,
    fail_batches: usize,
    insert_calls: usize,
}

/// In-memory remote store with a unique index on `id`.
///
/// Clones share the same state, so a test can keep a handle and act as a concurrent
/// writer or inspect the documents afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed documents directly, bypassing the outcome reporting.
    #[must_use]
    pub fn with_documents(self, records: Vec<Record>) -> Self {
        {
            let mut state = self.lock();
            for record in records {
                if state.ids.insert(record.id.clone()) {
                    state.documents.push(record);
                }
            }
        }
        self
    }

    /// Make every future insert of `id` report `Failed`.
    pub fn reject_id<S: Into<String>>(&self, id: S) {
        self.lock().reject_ids.insert(id.into());
    }

    /// Fail the next `count` `insert_many` calls as a whole.
    pub fn fail_next_batches(&self, count: usize) {
        self.lock().fail_batches = count;
    }

    #[must_use]
    pub fn documents(&self) -> Vec<Record> {
        self.lock().documents.clone()
    }

    #[must_use]
    pub fn indexes(&self) -> BTreeMap<String, bool> {
        self.lock().indexes.clone()
    }

    #[must_use]
    pub fn insert_calls(&self) -> usize {
        self.lock().insert_calls
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().documents.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn ensure_index(&mut self, field: &str, unique: bool) -> Result<(), RemoteError> {
        let mut state = self.lock();
        if let Some(existing) = state.indexes.get(field).copied() {
            if existing != unique {
                return Err(RemoteError(format!(
                    "index on {field} already exists with unique={existing}"
                )));
            }
        }
        state.indexes.insert(field.to_string(), unique);
        Ok(())
    }

    fn existing_ids(&self) -> Result<HashSet<String>, RemoteError> {
        Ok(self.lock().ids.clone())
    }

    fn exists(&self, id: &str) -> Result<bool, RemoteError> {
        Ok(self.lock().ids.contains(id))
    }

    fn insert_many(&mut self, records: &[Record]) -> Result<Vec<InsertOutcome>, RemoteError> {
        let mut state = self.lock();
        state.insert_calls += 1;
        if state.fail_batches > 0 {
            state.fail_batches -= 1;
            return Err(RemoteError("connection reset".to_string()));
        }
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            if state.reject_ids.contains(&record.id) {
                outcomes.push(InsertOutcome::Failed("document rejected".to_string()));
            } else if state.ids.insert(record.id.clone()) {
                state.documents.push(record.clone());
                outcomes.push(InsertOutcome::Inserted);
            } else {
                outcomes.push(InsertOutcome::DuplicateRejected);
            }
        }
        Ok(outcomes)
    }
}
