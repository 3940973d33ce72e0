//! Merger invariants: no duplicate ids ever reach the dataset, whatever is replayed.

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use mailvault_core::{
    BatchProgress, CheckpointStore, Dataset, Record, Vault, VaultError, constants::DATASET_FILE,
};

fn progress(next: usize, consumed: usize) -> BatchProgress {
    BatchProgress {
        cursor: None,
        next_cursor: Some(next.to_string()),
        consumed: consumed as u64,
        stale_streak: 0,
        at: Utc.with_ymd_and_hms(2024, 11, 2, 8, 0, 0).unwrap(),
    }
}

fn record(id: &str) -> Record {
    Record::new(id)
        .sender("statements@bank.example")
        .subject(format!("Statement {id}"))
        .body("Your statement is ready.")
}

#[test]
fn batch_of_ten_with_three_known_ids() {
    let dir = TempDir::new().unwrap();
    let mut vault = Vault::open(dir.path()).unwrap();
    vault
        .merge_batch(vec![record("m1"), record("m4"), record("m9")], &progress(3, 3))
        .unwrap();
    let before = vault.len();

    let candidates: Vec<Record> = (0..10).map(|n| record(&format!("m{n}"))).collect();
    let result = vault.merge_batch(candidates, &progress(13, 10)).unwrap();

    assert_eq!(result.accepted, 7);
    assert_eq!(result.rejected_duplicates, 3);
    assert_eq!(vault.len(), before + 7);
    assert_eq!(Dataset::load_from_dir(dir.path()).unwrap().len(), 10);
}

#[test]
fn overlapping_replays_never_duplicate() {
    let dir = TempDir::new().unwrap();
    let mut rng = fastrand::Rng::with_seed(0x6d61_696c);
    let pool: Vec<String> = (0..60).map(|n| format!("msg-{n:03}")).collect();
    let mut expected = HashSet::new();
    let mut cursor = 0;

    for round in 0..40 {
        // Reopen now and then so the dedup index is rebuilt from disk.
        let mut vault = Vault::open(dir.path()).unwrap();
        for _ in 0..3 {
            let size = rng.usize(1..15);
            let batch: Vec<Record> = (0..size)
                .map(|_| record(&pool[rng.usize(..pool.len())]))
                .collect();
            expected.extend(batch.iter().map(|r| r.id.clone()));
            cursor += size;
            vault.merge_batch(batch, &progress(cursor, size)).unwrap();
        }
        assert_eq!(vault.len(), expected.len(), "round {round}");
    }

    let dataset = Dataset::load_from_dir(dir.path()).unwrap();
    let ids: Vec<&str> = dataset.ids().collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert_eq!(unique.len(), expected.len());
}

#[test]
fn crash_between_dataset_and_checkpoint_replays_as_duplicates() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::in_dir(dir.path());
    {
        let mut vault = Vault::open(dir.path()).unwrap();
        vault
            .merge_batch(vec![record("a"), record("b")], &progress(2, 2))
            .unwrap();
    }
    let stale = store.load().unwrap().unwrap();
    {
        let mut vault = Vault::open(dir.path()).unwrap();
        vault
            .merge_batch(vec![record("c"), record("d")], &progress(4, 2))
            .unwrap();
    }
    // The dataset holds batch two but the checkpoint never moved past batch one.
    store.save(&stale).unwrap();
    let dataset_before = std::fs::read(dir.path().join(DATASET_FILE)).unwrap();

    let mut vault = Vault::open(dir.path()).unwrap();
    assert_eq!(vault.checkpoint().last_cursor.as_deref(), Some("2"));
    let result = vault
        .merge_batch(vec![record("c"), record("d")], &progress(4, 2))
        .unwrap();
    assert_eq!(result.accepted, 0);
    assert_eq!(result.rejected_duplicates, 2);
    assert_eq!(vault.checkpoint().last_cursor.as_deref(), Some("4"));
    assert_eq!(
        std::fs::read(dir.path().join(DATASET_FILE)).unwrap(),
        dataset_before
    );
}

#[test]
fn corrupted_dataset_refuses_to_open() {
    let dir = TempDir::new().unwrap();
    {
        let mut vault = Vault::open(dir.path()).unwrap();
        vault
            .merge_batch(vec![record("a")], &progress(1, 1))
            .unwrap();
    }
    let path = dir.path().join(DATASET_FILE);
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("Statement a", "Statement z")).unwrap();

    match Vault::open(dir.path()) {
        Err(VaultError::Integrity { path: failed, .. }) => assert_eq!(failed, path),
        other => panic!("expected integrity failure, got {other:?}"),
    }
}
