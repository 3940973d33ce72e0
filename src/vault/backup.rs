//! Immutable point-in-time copies of the dataset and checkpoint.
//!
//! Each snapshot lives in `backups/<id>/`. It is assembled in a hidden staging
//! directory and renamed into place, so a listed snapshot is always complete.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    BACKUP_DIR, CHECKPOINT_FILE, DATASET_FILE, LOCK_FILE, SNAPSHOT_CHECKPOINT_FILE,
    SNAPSHOT_DATASET_FILE, SNAPSHOT_DATASET_FILE_ZSTD, SNAPSHOT_FORMAT, SNAPSHOT_MANIFEST_FILE,
    ZSTD_LEVEL,
};
use crate::error::{Result, VaultError};
use crate::io::{DirLock, envelope};
use crate::types::RetentionPolicy;

const STAGING_PREFIX: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    /// Taken by the merger before it replaces the dataset.
    PreMerge,
    Periodic,
    /// Taken when a run suspends or completes.
    Shutdown,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotCompression {
    None,
    Zstd,
}

/// Description of one snapshot, stored as its `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: String,
    /// Monotonic within a backup directory; orders snapshots taken in the same instant.
    pub sequence: u64,
    pub reason: SnapshotReason,
    pub created_at: DateTime<Utc>,
    pub record_count: u64,
    /// blake3 of the uncompressed dataset file.
    pub dataset_digest: String,
    pub dataset_bytes: u64,
    pub compression: SnapshotCompression,
    pub has_checkpoint: bool,
}

/// Creates, lists, restores and prunes snapshots under `<data_dir>/backups`.
#[derive(Debug, Clone)]
pub struct BackupManager {
    data_dir: PathBuf,
    root: PathBuf,
    compress: bool,
}

impl BackupManager {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            root: data_dir.join(BACKUP_DIR),
            compress: false,
        }
    }

    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Copy the current dataset (and checkpoint, when present) into a new snapshot.
    ///
    /// Returns `Ok(None)` when there is no dataset file yet, since there is nothing to
    /// protect.
    pub fn snapshot(
        &self,
        reason: SnapshotReason,
        record_count: u64,
        created_at: DateTime<Utc>,
    ) -> Result<Option<SnapshotManifest>> {
        let dataset = match fs_err::read(self.data_dir.join(DATASET_FILE)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(?reason, "no dataset file; snapshot skipped");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let checkpoint = match fs_err::read(self.data_dir.join(CHECKPOINT_FILE)) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        let sequence = self
            .list()?
            .last()
            .map_or(1, |latest| latest.sequence.saturating_add(1));
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!(
            "{}-{:06}-{}",
            created_at.format("%Y%m%dT%H%M%S%.3fZ"),
            sequence,
            &suffix[..8]
        );

        let compression = if self.compress {
            SnapshotCompression::Zstd
        } else {
            SnapshotCompression::None
        };
        let manifest = SnapshotManifest {
            id: id.clone(),
            sequence,
            reason,
            created_at,
            record_count,
            dataset_digest: blake3::hash(&dataset).to_hex().to_string(),
            dataset_bytes: dataset.len() as u64,
            compression,
            has_checkpoint: checkpoint.is_some(),
        };

        let staging = self.root.join(format!("{STAGING_PREFIX}{id}"));
        fs_err::create_dir_all(&staging)?;
        if let Err(err) = fill_staging(&staging, &manifest, &dataset, checkpoint.as_deref()) {
            if let Err(cleanup) = remove_snapshot_dir(&staging) {
                tracing::warn!(path = %staging.display(), error = %cleanup, "failed to remove partial snapshot");
            }
            return Err(err);
        }
        fs_err::rename(&staging, self.snapshot_dir(&id))?;

        tracing::info!(
            snapshot.id = %id,
            snapshot.reason = ?reason,
            snapshot.records = record_count,
            snapshot.bytes = manifest.dataset_bytes,
            "snapshot created"
        );
        Ok(Some(manifest))
    }

    /// Complete snapshots, oldest first.
    pub fn list(&self) -> Result<Vec<SnapshotManifest>> {
        let entries = match fs_err::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut manifests = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(STAGING_PREFIX) || !entry.file_type()?.is_dir() {
                continue;
            }
            match self.manifest(name)? {
                Some(manifest) => manifests.push(manifest),
                None => tracing::warn!(snapshot.id = name, "snapshot directory without manifest"),
            }
        }
        manifests.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(manifests)
    }

    pub fn latest(&self) -> Result<Option<SnapshotManifest>> {
        Ok(self.list()?.pop())
    }

    fn manifest(&self, id: &str) -> Result<Option<SnapshotManifest>> {
        envelope::read(
            &self.snapshot_dir(id).join(SNAPSHOT_MANIFEST_FILE),
            SNAPSHOT_FORMAT,
        )
    }

    /// Read a snapshot's dataset bytes, verified against the manifest digest.
    pub fn dataset_bytes(&self, manifest: &SnapshotManifest) -> Result<Vec<u8>> {
        let dir = self.snapshot_dir(&manifest.id);
        let bytes = match manifest.compression {
            SnapshotCompression::Zstd => {
                let compressed = fs_err::read(dir.join(SNAPSHOT_DATASET_FILE_ZSTD))?;
                zstd::decode_all(compressed.as_slice())
                    .map_err(|err| VaultError::Compression(err.to_string()))?
            }
            SnapshotCompression::None => fs_err::read(dir.join(SNAPSHOT_DATASET_FILE))?,
        };
        if blake3::hash(&bytes).to_hex().as_str() != manifest.dataset_digest {
            return Err(VaultError::integrity(dir, "snapshot dataset digest mismatch"));
        }
        Ok(bytes)
    }

    /// Put the data directory back to the state captured by snapshot `id`.
    ///
    /// Operator action: takes the vault lock, so it fails with `Locked` while a run is
    /// active. The checkpoint is restored alongside the dataset, or removed when the
    /// snapshot holds none.
    pub fn restore(&self, id: &str) -> Result<SnapshotManifest> {
        let _lock = DirLock::acquire(&self.data_dir.join(LOCK_FILE))?;
        let manifest = self
            .manifest(id)?
            .ok_or_else(|| VaultError::SnapshotNotFound { id: id.to_string() })?;
        let dataset = self.dataset_bytes(&manifest)?;

        envelope::write_atomic(&self.data_dir.join(DATASET_FILE), &dataset)?;
        let checkpoint_path = self.data_dir.join(CHECKPOINT_FILE);
        if manifest.has_checkpoint {
            let checkpoint = fs_err::read(self.snapshot_dir(id).join(SNAPSHOT_CHECKPOINT_FILE))?;
            envelope::write_atomic(&checkpoint_path, &checkpoint)?;
        } else {
            match fs_err::remove_file(&checkpoint_path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        tracing::info!(
            snapshot.id = %manifest.id,
            snapshot.records = manifest.record_count,
            "snapshot restored"
        );
        Ok(manifest)
    }

    /// Delete snapshots beyond the retention policy, oldest first. The newest snapshot
    /// is always kept. Returns the removed ids.
    pub fn prune(&self, policy: RetentionPolicy) -> Result<Vec<String>> {
        let RetentionPolicy::KeepLatest(keep) = policy else {
            return Ok(Vec::new());
        };
        let manifests = self.list()?;
        let keep = keep.max(1);
        let excess = manifests.len().saturating_sub(keep);
        let mut removed = Vec::with_capacity(excess);
        for manifest in manifests.into_iter().take(excess) {
            remove_snapshot_dir(&self.snapshot_dir(&manifest.id))?;
            tracing::debug!(snapshot.id = %manifest.id, "snapshot pruned");
            removed.push(manifest.id);
        }
        Ok(removed)
    }
}

fn fill_staging(
    staging: &Path,
    manifest: &SnapshotManifest,
    dataset: &[u8],
    checkpoint: Option<&[u8]>,
) -> Result<()> {
    let mut written = Vec::with_capacity(3);
    match manifest.compression {
        SnapshotCompression::Zstd => {
            let compressed = zstd::encode_all(dataset, ZSTD_LEVEL)
                .map_err(|err| VaultError::Compression(err.to_string()))?;
            let path = staging.join(SNAPSHOT_DATASET_FILE_ZSTD);
            envelope::write_atomic(&path, &compressed)?;
            written.push(path);
        }
        SnapshotCompression::None => {
            let path = staging.join(SNAPSHOT_DATASET_FILE);
            envelope::write_atomic(&path, dataset)?;
            written.push(path);
        }
    }
    if let Some(bytes) = checkpoint {
        let path = staging.join(SNAPSHOT_CHECKPOINT_FILE);
        envelope::write_atomic(&path, bytes)?;
        written.push(path);
    }
    let path = staging.join(SNAPSHOT_MANIFEST_FILE);
    envelope::write(&path, SNAPSHOT_FORMAT, None, manifest)?;
    written.push(path);

    for path in written {
        set_readonly(&path, true)?;
    }
    Ok(())
}

fn set_readonly(path: &Path, readonly: bool) -> Result<()> {
    let mut permissions = fs_err::metadata(path)?.permissions();
    permissions.set_readonly(readonly);
    fs_err::set_permissions(path, permissions)?;
    Ok(())
}

fn remove_snapshot_dir(dir: &Path) -> Result<()> {
    for entry in fs_err::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            set_readonly(&path, false)?;
        }
    }
    fs_err::remove_dir_all(dir)?;
    Ok(())
}
