//! Incremental merge of candidate records into the dataset.

use std::collections::HashSet;

use crate::error::Result;
use crate::io::envelope;
use crate::types::{BatchProgress, MergeResult, Record};

use super::backup::SnapshotReason;
use super::lifecycle::Vault;

impl Vault {
    /// Admit the candidates whose ids are not yet known and advance the checkpoint.
    ///
    /// Ids already in the dataset, or repeated earlier in the same batch, are counted as
    /// duplicates. When anything is accepted the current dataset file is snapshotted
    /// first; a failed snapshot aborts the merge untouched. The dataset is then replaced
    /// in one atomic write, followed by the checkpoint. A failed dataset write restores
    /// the in-memory state and leaves the checkpoint where it was.
    pub fn merge_batch(
        &mut self,
        candidates: Vec<Record>,
        progress: &BatchProgress,
    ) -> Result<MergeResult> {
        let batch = self.checkpoint.batches.saturating_add(1);
        let mut staged: HashSet<String> = HashSet::with_capacity(candidates.len());
        let mut accepted = Vec::with_capacity(candidates.len());
        let mut rejected_duplicates = 0u64;

        for record in candidates {
            if self.dedup.contains(&record.id) || !staged.insert(record.id.clone()) {
                tracing::trace!(batch, id = %record.id, "duplicate discarded");
                rejected_duplicates += 1;
            } else {
                accepted.push(record);
            }
        }
        let result = MergeResult {
            accepted: accepted.len() as u64,
            rejected_duplicates,
        };

        let prior_len = self.dataset.len();
        if !accepted.is_empty() {
            if let Err(err) = self.snapshot(SnapshotReason::PreMerge, progress.at) {
                tracing::error!(
                    batch,
                    cursor = ?progress.cursor,
                    error = %err,
                    "pre-merge snapshot failed; batch not applied"
                );
                return Err(err);
            }

            self.dataset.extend(accepted);
            if let Err(err) = self.write_dataset() {
                let ids: Vec<&str> = self.dataset.records()[prior_len..]
                    .iter()
                    .map(|record| record.id.as_str())
                    .collect();
                tracing::error!(
                    batch,
                    cursor = ?progress.cursor,
                    ids = ?ids,
                    error = %err,
                    "dataset write failed; batch rolled back"
                );
                self.dataset.truncate(prior_len);
                return Err(err);
            }
            for id in staged {
                self.dedup.add(id);
            }
        }

        let next = self
            .checkpoint
            .advance(progress, result.accepted, self.dataset.len() as u64);
        if let Err(err) = self.checkpoints.save(&next) {
            tracing::error!(
                batch,
                cursor = ?progress.cursor,
                error = %err,
                "checkpoint save failed; batch is durable and will replay as duplicates"
            );
            return Err(err);
        }
        self.checkpoint = next;

        let growth_pct = if prior_len == 0 {
            if result.accepted > 0 { 100.0 } else { 0.0 }
        } else {
            result.accepted as f64 * 100.0 / prior_len as f64
        };
        tracing::info!(
            batch,
            cursor = ?progress.next_cursor,
            accepted = result.accepted,
            duplicates = result.rejected_duplicates,
            dataset_len = self.dataset.len(),
            growth_pct,
            "merge committed"
        );
        Ok(result)
    }

    fn write_dataset(&mut self) -> Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_dataset_write) {
            return Err(std::io::Error::other("injected dataset write failure").into());
        }
        let bytes = self.dataset.encode()?;
        envelope::write_atomic(&self.dataset_path(), &bytes)
    }
}
