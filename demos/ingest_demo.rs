//! End-to-end ingestion walkthrough: clean raw messages, ingest them with a suspend in
//! the middle, resume, reconcile into an in-memory remote and print statistics.
//!
//! Run with: RUST_LOG=mailvault_core=debug cargo run --example ingest_demo [config.json]

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

use mailvault_core::{
    Dataset, IngestOptions, MemoryRecordSource, MemoryRemoteStore, Orchestrator, Record,
    RecordSource, Result, SourceBatch, SourceError, SuspendHandle, TracingNotifier, VaultConfig,
    parse_mail_date, structure_body,
};

/// Raw messages as a mail transport would hand them over, newest first.
fn raw_messages() -> Vec<(&'static str, &'static str, &'static str, &'static str, &'static str)> {
    vec![
        (
            "<a1@bank.example>",
            "Fri, 8 Nov 2024 14:03:09 +0000 (UTC)",
            "Alerts <alerts@bank.example>",
            "Card payment",
            "You paid &pound;12.50 at Corner Shop.\u{200c} Details: https://bank.example/tx/1.",
        ),
        (
            "<n1@paper.example>",
            "Thu, 07 Nov 2024 07:00:00 EST",
            "news@paper.example",
            "Morning briefing",
            "Top stories [link] https://paper.example/today   and more&nbsp;inside",
        ),
        (
            "<a2@bank.example>",
            "Wed, 06 Nov 2024 18:45:00 -0800 (PST)",
            "alerts@bank.example",
            "Statement ready",
            "Your November statement is available.",
        ),
        (
            "<a1@bank.example>",
            "Fri, 8 Nov 2024 14:03:09 +0000",
            "Alerts <alerts@bank.example>",
            "Card payment",
            "Listed again on a later page.",
        ),
    ]
}

fn to_records() -> Vec<Record> {
    raw_messages()
        .into_iter()
        .map(|(id, date, from, subject, body)| {
            let structured = structure_body(body);
            let mut record = Record::new(id)
                .sender(from)
                .subject(subject)
                .body(structured.clean_text)
                .metadata("date_header", json!(date))
                .metadata("urls", json!(structured.urls));
            if let Some(at) = parse_mail_date(date) {
                record = record.received_at(at);
            }
            record
        })
        .collect()
}

/// Suspends the run after its first page, like an operator pausing a long import.
struct PauseOnce {
    inner: MemoryRecordSource,
    handle: Option<SuspendHandle>,
}

impl RecordSource for PauseOnce {
    fn fetch_batch(
        &mut self,
        cursor: Option<&str>,
        max_count: usize,
    ) -> std::result::Result<SourceBatch, SourceError> {
        if let Some(handle) = self.handle.take() {
            handle.suspend();
        }
        self.inner.fetch_batch(cursor, max_count)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dir = tempdir()?;
    let config = match std::env::args().nth(1) {
        Some(path) => VaultConfig::from_json_file(path)?,
        None => VaultConfig {
            data_dir: dir.path().join("vault"),
            ingest: IngestOptions::builder()
                .batch_size(2)
                .calls_per_second(20.0)
                .notification_threshold(2)
                .build(),
            ..VaultConfig::default()
        },
    };
    println!("=== mailvault ingestion demo ===");
    println!("data dir: {}\n", config.data_dir.display());

    let remote = MemoryRemoteStore::new();
    let handle = SuspendHandle::new();
    let source = PauseOnce {
        inner: MemoryRecordSource::new(to_records()),
        handle: Some(handle.clone()),
    };
    let mut orchestrator = Orchestrator::new(&config.data_dir, source, config.ingest.clone())?
        .with_notifier(Arc::new(TracingNotifier))
        .with_suspend_handle(handle)
        .with_reconciler(remote.clone(), config.reconcile.clone())?;

    let first = orchestrator.run()?;
    println!(
        "1. first run: {:?} after {} batch(es), cursor {:?}",
        first.state, first.batches, first.cursor
    );

    let second = orchestrator.run()?;
    println!(
        "2. resumed from {:?}: {:?}, accepted {}, duplicates {}",
        second.resumed_from, second.state, second.accepted, second.duplicates
    );
    if let Some(sync) = &second.sync {
        println!(
            "3. remote sync: inserted {}, already present {}",
            sync.inserted, sync.already_present
        );
    }

    let stats = Dataset::load_from_dir(&config.data_dir)?.stats();
    println!("4. dataset: {} records", stats.total_records);
    if let Some(range) = &stats.date_range {
        println!("   from {} to {}", range.earliest, range.latest);
    }
    for sender in &stats.top_senders {
        println!("   {:>3}  {}", sender.count, sender.sender);
    }
    println!("   remote documents: {}", remote.len());
    Ok(())
}
