//! Persistence of the ingestion checkpoint.

use std::path::{Path, PathBuf};

use crate::constants::{CHECKPOINT_FILE, CHECKPOINT_FORMAT};
use crate::error::Result;
use crate::io::envelope;
use crate::types::Checkpoint;

/// Reads and atomically replaces `checkpoint.json`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(CHECKPOINT_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` means a fresh start from the source's natural origin.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        envelope::read(&self.path, CHECKPOINT_FORMAT)
    }

    /// A crash during `save` leaves the previous checkpoint in place.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        envelope::write(&self.path, CHECKPOINT_FORMAT, None, checkpoint)?;
        tracing::debug!(
            checkpoint.cursor = ?checkpoint.last_cursor,
            checkpoint.processed = checkpoint.processed_count,
            checkpoint.batches = checkpoint.batches,
            "checkpoint saved"
        );
        Ok(())
    }
}
