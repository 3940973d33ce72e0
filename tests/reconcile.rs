//! Remote reconciliation: minimal inserts, idempotence, duplicate-key races.

use std::collections::HashSet;

use chrono::Utc;
use tempfile::TempDir;

use mailvault_core::{
    BatchProgress, InsertOutcome, MemoryRemoteStore, ReconcileOptions, Reconciler, Record,
    RemoteError, RemoteStore, Vault, diff,
};

fn seed(dir: &TempDir, ids: &[&str]) {
    let mut vault = Vault::open(dir.path()).unwrap();
    let progress = BatchProgress {
        cursor: vault.checkpoint().last_cursor.clone(),
        next_cursor: Some(format!("{}", vault.len() + ids.len())),
        consumed: ids.len() as u64,
        stale_streak: 0,
        at: Utc::now(),
    };
    let records = ids
        .iter()
        .map(|id| Record::new(*id).subject(format!("local {id}")))
        .collect();
    vault.merge_batch(records, &progress).unwrap();
}

#[test]
fn inserts_only_what_the_remote_lacks() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &["A", "B", "C"]);
    let remote =
        MemoryRemoteStore::new().with_documents(vec![Record::new("B").subject("remote B")]);
    let mut reconciler =
        Reconciler::new(dir.path(), remote.clone(), ReconcileOptions::default()).unwrap();

    let report = reconciler.sync().unwrap();
    assert_eq!(report.missing, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.already_present, 0);

    let documents = remote.documents();
    let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["B", "A", "C"]);
    assert_eq!(documents[0].subject, "remote B");

    let remote_ids = remote.existing_ids().unwrap();
    let local = ["A", "B", "C"];
    assert!(diff(local, &remote_ids).is_empty());
}

#[test]
fn second_sync_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &["A", "B"]);
    let remote = MemoryRemoteStore::new();
    let options = ReconcileOptions {
        remote_batch_size: 1,
        ..ReconcileOptions::default()
    };
    let mut reconciler = Reconciler::new(dir.path(), remote.clone(), options).unwrap();

    let first = reconciler.sync().unwrap();
    assert_eq!(first.batches, 2);
    let calls = remote.insert_calls();

    let second = reconciler.sync().unwrap();
    assert_eq!(second.missing, 0);
    assert_eq!(second.inserted, 0);
    assert_eq!(remote.insert_calls(), calls);
    assert!(reconciler.verify().unwrap().is_consistent());
}

/// Another writer stores `A` between our id fetch and our insert.
struct RacingStore {
    inner: MemoryRemoteStore,
    racer: MemoryRemoteStore,
}

impl RemoteStore for RacingStore {
    fn ensure_index(&mut self, field: &str, unique: bool) -> Result<(), RemoteError> {
        self.inner.ensure_index(field, unique)
    }

    fn existing_ids(&self) -> Result<HashSet<String>, RemoteError> {
        let ids = self.inner.existing_ids()?;
        let mut racer = self.racer.clone();
        racer.insert_many(&[Record::new("A").subject("racer")])?;
        Ok(ids)
    }

    fn exists(&self, id: &str) -> Result<bool, RemoteError> {
        self.inner.exists(id)
    }

    fn insert_many(&mut self, records: &[Record]) -> Result<Vec<InsertOutcome>, RemoteError> {
        self.inner.insert_many(records)
    }
}

#[test]
fn duplicate_key_race_counts_as_present() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &["A", "B"]);
    let remote = MemoryRemoteStore::new();
    let store = RacingStore {
        inner: remote.clone(),
        racer: remote.clone(),
    };
    let mut reconciler = Reconciler::new(dir.path(), store, ReconcileOptions::default()).unwrap();

    let report = reconciler.sync().unwrap();
    assert_eq!(report.missing, 2);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.already_present, 1);
    assert!(report.is_clean());

    let documents = remote.documents();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents.iter().filter(|d| d.id == "A").count(), 1);
}

#[test]
fn sync_runs_while_ingestion_holds_the_lock() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &["A", "B", "C"]);
    let _ingesting = Vault::open(dir.path()).unwrap();

    let remote = MemoryRemoteStore::new().with_documents(vec![Record::new("Z")]);
    let mut reconciler =
        Reconciler::new(dir.path(), remote, ReconcileOptions::default()).unwrap();
    assert_eq!(reconciler.sync().unwrap().inserted, 3);

    let consistency = reconciler.verify().unwrap();
    assert_eq!(consistency.local_only, 0);
    assert_eq!(consistency.remote_only, 1);
    assert!(!consistency.is_consistent());
}

#[test]
fn zero_batch_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let options = ReconcileOptions {
        remote_batch_size: 0,
        ..ReconcileOptions::default()
    };
    assert!(Reconciler::new(dir.path(), MemoryRemoteStore::new(), options).is_err());
}
