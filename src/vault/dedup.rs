//! In-memory index of every id already persisted in the dataset.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{Result, VaultError};
use crate::types::Record;

/// Hash set of known record ids; the single answer to "seen before?".
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    ids: HashSet<String>,
}

impl DedupIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from a loaded dataset.
    ///
    /// A repeated id means the dataset file violates its own uniqueness invariant and is
    /// reported as an integrity failure of `path`.
    pub fn build<'a, I>(records: I, path: &Path) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let records = records.into_iter();
        let mut ids = HashSet::with_capacity(records.size_hint().0);
        for record in records {
            if !ids.insert(record.id.clone()) {
                return Err(VaultError::integrity(
                    path,
                    format!("duplicate record id {}", record.id),
                ));
            }
        }
        Ok(Self { ids })
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns `true` when `id` was not known before.
    pub fn add<S: Into<String>>(&mut self, id: S) -> bool {
        self.ids.insert(id.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}
