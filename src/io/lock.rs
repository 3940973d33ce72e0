//! Exclusive advisory lock on a vault data directory.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, VaultError};

/// Held for the lifetime of a writable vault; released on drop.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Try to take the lock without waiting; a second ingestion run gets `Locked`.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "vault lock acquired");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                Err(VaultError::Locked {
                    path: path.to_path_buf(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %err, "vault unlock failed");
        } else {
            tracing::debug!(path = %self.path.display(), "vault lock released");
        }
    }
}
