//! Error types for `mailvault-core`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors surfaced by the vault, the ingestion loop and the reconciler.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted artifact failed its checksum or could not be decoded.
    ///
    /// Fatal at open; recovery is an operator-driven snapshot restore.
    #[error("integrity check failed for {path}: {reason}")]
    Integrity { path: PathBuf, reason: String },

    #[error("data directory {path} is locked by another ingestion run")]
    Locked { path: PathBuf },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// The record source reported a failure it cannot recover from.
    #[error("record source failed at cursor {cursor:?}: {reason}")]
    SourceFatal {
        cursor: Option<String>,
        reason: String,
    },

    /// Transient source failures persisted past the retry budget.
    #[error(
        "record source still failing at cursor {cursor:?} after {attempts} attempts (last delay {last_delay:?}): {reason}"
    )]
    RetriesExhausted {
        cursor: Option<String>,
        attempts: u32,
        last_delay: Duration,
        reason: String,
    },

    /// The remote store rejected a whole operation (as opposed to a single record).
    #[error("remote store error: {0}")]
    Remote(String),

    #[error("snapshot {id} not found")]
    SnapshotNotFound { id: String },

    #[error("zstd error: {0}")]
    Compression(String),
}

impl VaultError {
    pub(crate) fn integrity(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Whether the failure leaves the on-disk state trustworthy.
    ///
    /// Integrity failures mean the last snapshot is the recovery point.
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}
