//! Brings the remote store up to date with the local dataset.
//!
//! The reconciler only ever inserts. It reads `dataset.json` without the vault lock,
//! which is safe because that file is replaced atomically, so it can run next to an
//! active ingestion. Records that race in from another writer are rejected by the
//! remote unique index and counted as already present.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};
use crate::types::{ConsistencyReport, Record, ReconcileOptions, SyncReport};
use crate::vault::Dataset;

use super::remote::{InsertOutcome, RemoteStore};

/// Fields indexed by [`Reconciler::prepare`]; only `id` is unique.
pub const REMOTE_INDEXES: [(&str, bool); 4] = [
    ("id", true),
    ("received_at", false),
    ("sender", false),
    ("subject", false),
];

/// Ids present locally but absent remotely.
pub fn diff<'a, L>(local_ids: L, remote_ids: &HashSet<String>) -> HashSet<String>
where
    L: IntoIterator<Item = &'a str>,
{
    local_ids
        .into_iter()
        .filter(|id| !remote_ids.contains(*id))
        .map(str::to_string)
        .collect()
}

pub struct Reconciler<R: RemoteStore> {
    data_dir: PathBuf,
    remote: R,
    options: ReconcileOptions,
    prepared: bool,
}

impl<R: RemoteStore> Reconciler<R> {
    pub fn new<P: AsRef<Path>>(data_dir: P, remote: R, options: ReconcileOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            remote,
            options,
            prepared: false,
        })
    }

    #[must_use]
    pub fn remote(&self) -> &R {
        &self.remote
    }

    #[must_use]
    pub fn into_remote(self) -> R {
        self.remote
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Create the remote indexes: unique on `id`, plain on the query fields.
    pub fn prepare(&mut self) -> Result<()> {
        for (field, unique) in REMOTE_INDEXES {
            self.remote.ensure_index(field, unique)?;
        }
        self.prepared = true;
        tracing::debug!("remote indexes ensured");
        Ok(())
    }

    /// Insert every locally stored record the remote lacks, in dataset order.
    pub fn sync(&mut self) -> Result<SyncReport> {
        if self.options.ensure_indexes && !self.prepared {
            self.prepare()?;
        }
        let dataset = Dataset::load_from_dir(&self.data_dir)?;
        let remote_ids = self.remote.existing_ids()?;
        let missing = diff(dataset.ids(), &remote_ids);

        let mut report = SyncReport {
            local_records: dataset.len() as u64,
            remote_before: remote_ids.len() as u64,
            missing: missing.len() as u64,
            ..SyncReport::default()
        };
        let pending: Vec<Record> = dataset
            .into_records()
            .into_iter()
            .filter(|record| missing.contains(&record.id))
            .collect();

        for chunk in pending.chunks(self.options.remote_batch_size) {
            let batch = report.batches + 1;
            let outcomes = match self.remote.insert_many(chunk) {
                Ok(outcomes) => outcomes,
                Err(err) => {
                    tracing::error!(
                        batch,
                        first_id = chunk.first().map(|record| record.id.as_str()),
                        last_id = chunk.last().map(|record| record.id.as_str()),
                        error = %err,
                        "remote insert batch failed"
                    );
                    return Err(err.into());
                }
            };
            if outcomes.len() != chunk.len() {
                return Err(VaultError::Remote(format!(
                    "insert_many returned {} outcomes for {} records",
                    outcomes.len(),
                    chunk.len()
                )));
            }
            for (record, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    InsertOutcome::Inserted => report.inserted += 1,
                    InsertOutcome::DuplicateRejected => {
                        tracing::debug!(id = %record.id, "already present remotely");
                        report.already_present += 1;
                    }
                    InsertOutcome::Failed(reason) => {
                        tracing::warn!(batch, id = %record.id, %reason, "remote insert failed");
                        report.failed += 1;
                        report.failed_ids.push(record.id.clone());
                    }
                }
            }
            report.batches = batch;
        }

        tracing::info!(
            local = report.local_records,
            missing = report.missing,
            inserted = report.inserted,
            already_present = report.already_present,
            failed = report.failed,
            "remote sync finished"
        );
        Ok(report)
    }

    /// Compare local and remote ids in both directions.
    pub fn verify(&self) -> Result<ConsistencyReport> {
        let dataset = Dataset::load_from_dir(&self.data_dir)?;
        let remote_ids = self.remote.existing_ids()?;
        let local_ids: HashSet<&str> = dataset.ids().collect();

        let local_only = diff(local_ids.iter().copied(), &remote_ids).len() as u64;
        let remote_only = remote_ids
            .iter()
            .filter(|id| !local_ids.contains(id.as_str()))
            .count() as u64;
        let report = ConsistencyReport {
            local_records: local_ids.len() as u64,
            remote_records: remote_ids.len() as u64,
            local_only,
            remote_only,
        };
        if report.is_consistent() {
            tracing::info!(records = report.local_records, "local and remote are consistent");
        } else {
            tracing::warn!(
                local_only = report.local_only,
                remote_only = report.remote_only,
                "local and remote differ"
            );
        }
        Ok(report)
    }
}

impl<R: RemoteStore + 'static> Reconciler<R> {
    /// Erase the remote type, for holders that do not care which store is behind it.
    #[must_use]
    pub fn boxed(self) -> Reconciler<Box<dyn RemoteStore>> {
        Reconciler {
            data_dir: self.data_dir,
            remote: Box::new(self.remote),
            options: self.options,
            prepared: self.prepared,
        }
    }
}
