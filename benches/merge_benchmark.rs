//! Merge throughput benchmarks.
//!
//! - `merge_fresh_batch`: a batch of unseen records into a vault of a given size
//! - `merge_duplicate_batch`: a batch whose ids are all known (dedup path only)
//! - `dataset_stats`: statistics over a loaded dataset
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench merge_benchmark
//! ```

use chrono::{Duration, TimeZone, Utc};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use mailvault_core::{BatchProgress, Dataset, Record, RetentionPolicy, Vault, VaultSettings};
use tempfile::TempDir;

const BATCH: usize = 50;

fn record(n: usize) -> Record {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Record::new(format!("<{n}@bench.example>"))
        .received_at(base + Duration::minutes(n as i64))
        .sender(format!("sender{}@bench.example", n % 17))
        .subject(format!("Message {n}"))
        .body("Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(8))
}

fn progress(cursor: usize) -> BatchProgress {
    BatchProgress {
        cursor: None,
        next_cursor: Some(cursor.to_string()),
        consumed: BATCH as u64,
        stale_streak: 0,
        at: Utc::now(),
    }
}

fn seeded_vault(size: usize) -> (TempDir, Vault) {
    let dir = TempDir::new().unwrap();
    let settings = VaultSettings {
        retention: RetentionPolicy::KeepLatest(1),
        compress_snapshots: false,
    };
    let mut vault = Vault::open_with(dir.path(), settings, Utc::now()).unwrap();
    for start in (0..size).step_by(1_000) {
        let end = (start + 1_000).min(size);
        vault
            .merge_batch((start..end).map(record).collect(), &progress(end))
            .unwrap();
    }
    (dir, vault)
}

fn bench_fresh_batch(c: &mut Criterion) {
    for size in [1_000usize, 10_000] {
        c.bench_function(&format!("merge_fresh_batch/{size}"), |b| {
            b.iter_batched(
                || seeded_vault(size),
                |(dir, mut vault)| {
                    let batch = (size..size + BATCH).map(record).collect();
                    vault.merge_batch(batch, &progress(size + BATCH)).unwrap();
                    drop(vault);
                    drop(dir);
                },
                BatchSize::PerIteration,
            );
        });
    }
}

fn bench_duplicate_batch(c: &mut Criterion) {
    let (_dir, mut vault) = seeded_vault(10_000);
    let mut cursor = 10_000;
    c.bench_function("merge_duplicate_batch", |b| {
        b.iter(|| {
            cursor += BATCH;
            let batch = (0..BATCH).map(|n| record(n * 97)).collect();
            let result = vault.merge_batch(batch, &progress(cursor)).unwrap();
            assert_eq!(result.accepted, 0);
        });
    });
}

fn bench_stats(c: &mut Criterion) {
    let dataset = Dataset::new((0..20_000).map(record).collect());
    c.bench_function("dataset_stats", |b| b.iter(|| dataset.stats()));
}

criterion_group!(
    benches,
    bench_fresh_batch,
    bench_duplicate_batch,
    bench_stats
);
criterion_main!(benches);
