//! Opening and closing a vault data directory.
//!
//! Opening takes the directory lock, loads and verifies the dataset, rebuilds the
//! dedup index and loads (or creates) the checkpoint. A resumed run and a cold start
//! go through exactly this path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::constants::{DATASET_FILE, LOCK_FILE};
use crate::error::{Result, VaultError};
use crate::io::DirLock;
use crate::types::{Checkpoint, IngestOptions, RetentionPolicy};

use super::backup::{BackupManager, SnapshotManifest, SnapshotReason};
use super::checkpoint::CheckpointStore;
use super::dataset::Dataset;
use super::dedup::DedupIndex;

/// Snapshot behaviour of an open vault.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VaultSettings {
    pub retention: RetentionPolicy,
    pub compress_snapshots: bool,
}

impl From<&IngestOptions> for VaultSettings {
    fn from(options: &IngestOptions) -> Self {
        Self {
            retention: options.retention,
            compress_snapshots: options.compress_snapshots,
        }
    }
}

/// Exclusive handle on a data directory.
///
/// The merger is the only writer of the dataset and the dedup index, and both only
/// change through [`Vault::merge_batch`]. Dropping the handle releases the lock.
pub struct Vault {
    pub(crate) data_dir: PathBuf,
    pub(crate) dataset: Dataset,
    pub(crate) dedup: DedupIndex,
    pub(crate) checkpoints: CheckpointStore,
    pub(crate) checkpoint: Checkpoint,
    pub(crate) backups: BackupManager,
    pub(crate) settings: VaultSettings,
    #[cfg(test)]
    pub(crate) fail_next_dataset_write: bool,
    lock: DirLock,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("data_dir", &self.data_dir)
            .field("records", &self.dataset.len())
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}

impl Vault {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        Self::open_with(data_dir, VaultSettings::default(), Utc::now())
    }

    /// Open with explicit snapshot settings; `now` stamps a freshly created checkpoint.
    pub fn open_with<P: AsRef<Path>>(
        data_dir: P,
        settings: VaultSettings,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs_err::create_dir_all(&data_dir)?;
        let lock = DirLock::acquire(&data_dir.join(LOCK_FILE))?;

        let dataset_path = data_dir.join(DATASET_FILE);
        let dataset = Dataset::load(&dataset_path)?;
        let dedup = DedupIndex::build(dataset.iter(), &dataset_path)?;

        let checkpoints = CheckpointStore::in_dir(&data_dir);
        let checkpoint = match checkpoints.load()? {
            Some(checkpoint) => {
                if checkpoint.dataset_len > dataset.len() as u64 {
                    return Err(VaultError::integrity(
                        checkpoints.path(),
                        format!(
                            "checkpoint records {} persisted records but the dataset holds {}",
                            checkpoint.dataset_len,
                            dataset.len()
                        ),
                    ));
                }
                checkpoint
            }
            None => {
                let checkpoint = Checkpoint {
                    dataset_len: dataset.len() as u64,
                    ..Checkpoint::origin(now)
                };
                checkpoints.save(&checkpoint)?;
                checkpoint
            }
        };

        let backups =
            BackupManager::new(&data_dir).with_compression(settings.compress_snapshots);

        tracing::info!(
            data_dir = %data_dir.display(),
            records = dataset.len(),
            cursor = ?checkpoint.last_cursor,
            batches = checkpoint.batches,
            "vault opened"
        );

        Ok(Self {
            data_dir,
            dataset,
            dedup,
            checkpoints,
            checkpoint,
            backups,
            settings,
            #[cfg(test)]
            fail_next_dataset_write: false,
            lock,
        })
    }

    /// Release the lock explicitly. Equivalent to dropping the handle.
    pub fn close(self) {
        tracing::debug!(data_dir = %self.data_dir.display(), "vault closed");
        drop(self);
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    #[must_use]
    pub fn dataset_path(&self) -> PathBuf {
        self.data_dir.join(DATASET_FILE)
    }

    #[must_use]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    #[must_use]
    pub fn dedup(&self) -> &DedupIndex {
        &self.dedup
    }

    #[must_use]
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    #[must_use]
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.dedup.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Take a snapshot and apply the retention policy.
    ///
    /// Records the snapshot time in the in-memory checkpoint; it reaches disk with the
    /// next checkpoint save. Pre-merge snapshots do not move the periodic backup clock.
    /// A failed prune is logged and leaves the new snapshot intact.
    pub fn snapshot(
        &mut self,
        reason: SnapshotReason,
        now: DateTime<Utc>,
    ) -> Result<Option<SnapshotManifest>> {
        let manifest = self
            .backups
            .snapshot(reason, self.dataset.len() as u64, now)?;
        if manifest.is_some() {
            self.checkpoint.last_backup_at = Some(now);
            if reason != SnapshotReason::PreMerge {
                self.checkpoint.last_periodic_backup_at = Some(now);
            }
            if let Err(err) = self.backups.prune(self.settings.retention) {
                tracing::warn!(error = %err, "snapshot retention prune failed");
            }
        }
        Ok(manifest)
    }

    /// Persist the in-memory checkpoint as is.
    pub fn save_checkpoint(&self) -> Result<()> {
        self.checkpoints.save(&self.checkpoint)
    }
}
