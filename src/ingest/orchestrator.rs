//! The ingestion loop: fetch, screen, merge, checkpoint, then side effects.
//!
//! Each `run()` opens the vault afresh, so resuming after a suspension or a crash is
//! the same code path as a cold start; the checkpoint (cursor and cutoff streak) is the
//! only resume state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock, elapsed};
use crate::error::{Result, VaultError};
use crate::sync::{Reconciler, RemoteStore};
use crate::types::{BatchProgress, IngestOptions, ReconcileOptions, Record, SyncReport};
use crate::vault::{SnapshotReason, Vault, VaultSettings};

use super::notify::{Notification, NotificationKind, Notifier, TracingNotifier};
use super::rate::RateLimiter;
use super::retry::Backoff;
use super::source::{RecordSource, SourceBatch, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Suspended,
    Completed,
    Failed,
}

/// Cross-thread suspend request, honored at the next batch boundary.
#[derive(Debug, Clone, Default)]
pub struct SuspendHandle(Arc<AtomicBool>);

impl SuspendHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suspend(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending request.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// What one `run()` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub state: RunState,
    pub batches: u64,
    /// Candidates pulled from the source during this run.
    pub consumed: u64,
    pub accepted: u64,
    pub duplicates: u64,
    /// Dropped by the sender allow-list or the cutoff date.
    pub filtered: u64,
    pub retries: u64,
    /// Periodic and shutdown snapshots; pre-merge snapshots are not counted.
    pub snapshots: u64,
    pub notifications: u64,
    pub resumed_from: Option<String>,
    pub cursor: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sync: Option<SyncReport>,
}

impl RunReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            state: RunState::Running,
            batches: 0,
            consumed: 0,
            accepted: 0,
            duplicates: 0,
            filtered: 0,
            retries: 0,
            snapshots: 0,
            notifications: 0,
            resumed_from: None,
            cursor: None,
            started_at,
            finished_at: None,
            sync: None,
        }
    }
}

#[derive(Debug, Default)]
struct Screened {
    kept: Vec<Record>,
    filtered: u64,
    /// The cutoff streak reached `max_consecutive_stale`.
    exhausted: bool,
}

/// Drives a [`RecordSource`] into a vault directory.
pub struct Orchestrator<S: RecordSource> {
    data_dir: PathBuf,
    source: S,
    options: IngestOptions,
    clock: Arc<dyn Clock>,
    notifier: Box<dyn Notifier>,
    reconciler: Option<Reconciler<Box<dyn RemoteStore>>>,
    suspend: SuspendHandle,
    state: RunState,
    stale_streak: u32,
    sender_filter: Vec<String>,
    last_report: Option<RunReport>,
}

impl<S: RecordSource> Orchestrator<S> {
    pub fn new<P: AsRef<Path>>(data_dir: P, source: S, options: IngestOptions) -> Result<Self> {
        options.validate()?;
        let sender_filter = options
            .sender_filter
            .iter()
            .map(|sender| sender.to_lowercase())
            .collect();
        Ok(Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            source,
            options,
            clock: Arc::new(SystemClock),
            notifier: Box::new(TracingNotifier),
            reconciler: None,
            suspend: SuspendHandle::new(),
            state: RunState::Idle,
            stale_streak: 0,
            sender_filter,
            last_report: None,
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_notifier<N: Notifier + 'static>(mut self, notifier: N) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    #[must_use]
    pub fn with_suspend_handle(mut self, handle: SuspendHandle) -> Self {
        self.suspend = handle;
        self
    }

    /// Attach a remote store; it is synced when a run completes and
    /// `reconcile_on_complete` is set.
    pub fn with_reconciler<R: RemoteStore + 'static>(
        mut self,
        remote: R,
        options: ReconcileOptions,
    ) -> Result<Self> {
        self.reconciler = Some(Reconciler::new(&self.data_dir, remote, options)?.boxed());
        Ok(self)
    }

    #[must_use]
    pub fn suspend_handle(&self) -> SuspendHandle {
        self.suspend.clone()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    #[must_use]
    pub fn into_source(self) -> S {
        self.source
    }

    /// Report of the most recent run, including failed ones.
    #[must_use]
    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Run until the source is exhausted, a suspend is requested, or a fatal error.
    ///
    /// The vault is opened at the start and released on every exit path. On failure an
    /// error notification is sent and the error is returned; the last saved checkpoint
    /// is untouched.
    pub fn run(&mut self) -> Result<RunReport> {
        let started_at = self.clock.now();
        let mut report = RunReport::new(started_at);
        let span = tracing::info_span!("ingest_run", run_id = %report.run_id);
        let _entered = span.enter();

        self.state = RunState::Running;
        tracing::info!(data_dir = %self.data_dir.display(), "ingestion run started");

        let mut vault = match Vault::open_with(
            &self.data_dir,
            VaultSettings::from(&self.options),
            started_at,
        ) {
            Ok(vault) => vault,
            Err(err) => return Err(self.fail(report, 0, 0, err)),
        };
        report.resumed_from = vault.checkpoint().last_cursor.clone();

        let outcome = self.drive(&mut vault, &mut report);
        report.cursor = vault.checkpoint().last_cursor.clone();
        let state = match outcome {
            Ok(state) => state,
            Err(err) => {
                let processed = vault.checkpoint().processed_count;
                let accepted = vault.checkpoint().accepted_count;
                drop(vault);
                return Err(self.fail(report, processed, accepted, err));
            }
        };

        self.final_snapshot(&mut vault, &mut report);
        vault.close();

        if state == RunState::Completed && self.options.reconcile_on_complete {
            if let Some(reconciler) = self.reconciler.as_mut() {
                match reconciler.sync() {
                    Ok(sync) => report.sync = Some(sync),
                    Err(err) => return Err(self.fail(report, 0, 0, err)),
                }
            }
        }

        self.state = state;
        report.state = state;
        report.finished_at = Some(self.clock.now());
        tracing::info!(
            state = ?state,
            batches = report.batches,
            accepted = report.accepted,
            duplicates = report.duplicates,
            filtered = report.filtered,
            retries = report.retries,
            cursor = ?report.cursor,
            "ingestion run finished"
        );
        self.last_report = Some(report.clone());
        Ok(report)
    }

    fn drive(&mut self, vault: &mut Vault, report: &mut RunReport) -> Result<RunState> {
        let mut limiter = RateLimiter::per_second(self.options.calls_per_second);
        let mut backoff = Backoff::from_options(&self.options);
        self.stale_streak = vault.checkpoint().stale_streak;
        loop {
            if self.suspend.take() {
                tracing::info!(cursor = ?vault.checkpoint().last_cursor, "suspend requested");
                return Ok(RunState::Suspended);
            }

            let cursor = vault.checkpoint().last_cursor.clone();
            let batch =
                self.fetch_with_retry(cursor.as_deref(), &mut limiter, &mut backoff, report)?;
            if batch.has_more && batch.next_cursor.is_none() {
                return Err(VaultError::SourceFatal {
                    cursor,
                    reason: "source reported more records without a next cursor".to_string(),
                });
            }

            let consumed = batch.records.len() as u64;
            let screened = self.screen(batch.records);
            let progress = BatchProgress {
                cursor,
                next_cursor: batch.next_cursor,
                consumed,
                stale_streak: self.stale_streak,
                at: self.clock.now(),
            };
            let accepted_before = vault.checkpoint().accepted_count;
            let merged = vault.merge_batch(screened.kept, &progress)?;

            report.batches += 1;
            report.consumed += consumed;
            report.accepted += merged.accepted;
            report.duplicates += merged.rejected_duplicates;
            report.filtered += screened.filtered;

            self.maybe_notify(vault, accepted_before, report);
            self.maybe_backup(vault, report);

            if screened.exhausted {
                tracing::info!(
                    streak = self.stale_streak,
                    "consecutive messages older than the cutoff; stopping"
                );
                return Ok(RunState::Completed);
            }
            if !batch.has_more {
                return Ok(RunState::Completed);
            }
        }
    }

    fn fetch_with_retry(
        &mut self,
        cursor: Option<&str>,
        limiter: &mut RateLimiter,
        backoff: &mut Backoff,
        report: &mut RunReport,
    ) -> Result<SourceBatch> {
        let mut last_delay = Duration::ZERO;
        loop {
            limiter.acquire(self.clock.as_ref());
            let err = match self.source.fetch_batch(cursor, self.options.batch_size) {
                Ok(batch) => {
                    backoff.reset();
                    return Ok(batch);
                }
                Err(SourceError::Fatal(reason)) => {
                    tracing::error!(cursor, %reason, "record source failed");
                    return Err(VaultError::SourceFatal {
                        cursor: cursor.map(str::to_string),
                        reason,
                    });
                }
                Err(err) => err,
            };
            match backoff.next_delay(err.retry_after()) {
                Some(delay) => {
                    report.retries += 1;
                    last_delay = delay;
                    tracing::warn!(
                        cursor,
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying record source"
                    );
                    self.clock.sleep(delay);
                }
                None => {
                    tracing::error!(
                        cursor,
                        attempts = backoff.attempts() + 1,
                        error = %err,
                        "record source retry budget exhausted"
                    );
                    return Err(VaultError::RetriesExhausted {
                        cursor: cursor.map(str::to_string),
                        attempts: backoff.attempts() + 1,
                        last_delay,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    /// Apply the cutoff date and the sender allow-list.
    fn screen(&mut self, records: Vec<Record>) -> Screened {
        let mut screened = Screened {
            kept: Vec::with_capacity(records.len()),
            ..Screened::default()
        };
        for record in records {
            let stale = match (self.options.cutoff, record.received_at) {
                (Some(cutoff), Some(at)) => at < cutoff,
                _ => false,
            };
            if stale {
                self.stale_streak += 1;
                screened.filtered += 1;
                if self.stale_streak >= self.options.max_consecutive_stale {
                    screened.exhausted = true;
                    break;
                }
                continue;
            }
            self.stale_streak = 0;

            if !self.sender_filter.is_empty() {
                let sender = record.sender.to_lowercase();
                if !self
                    .sender_filter
                    .iter()
                    .any(|allowed| sender.contains(allowed.as_str()))
                {
                    tracing::trace!(id = %record.id, sender = %record.sender, "sender filtered");
                    screened.filtered += 1;
                    continue;
                }
            }
            screened.kept.push(record);
        }
        screened
    }

    fn maybe_notify(&self, vault: &Vault, accepted_before: u64, report: &mut RunReport) {
        let threshold = self.options.notification_threshold;
        let total = vault.checkpoint().accepted_count;
        if total / threshold <= accepted_before / threshold {
            return;
        }
        let notification = Notification {
            kind: NotificationKind::Progress,
            run_id: report.run_id.clone(),
            state: RunState::Running,
            started_at: report.started_at,
            sent_at: self.clock.now(),
            total_accepted: total,
            processed: vault.checkpoint().processed_count,
            latest_received_at: vault.dataset().latest_received_at(),
            last_backup_at: vault.checkpoint().last_backup_at,
            error: None,
        };
        if self.deliver(&notification) {
            report.notifications += 1;
        }
    }

    fn maybe_backup(&self, vault: &mut Vault, report: &mut RunReport) {
        let now = self.clock.now();
        let since = vault
            .checkpoint()
            .last_periodic_backup_at
            .unwrap_or(report.started_at);
        if elapsed(since, now) < self.options.backup_interval() {
            return;
        }
        match vault.snapshot(SnapshotReason::Periodic, now) {
            Ok(Some(_)) => {
                report.snapshots += 1;
                if let Err(err) = vault.save_checkpoint() {
                    tracing::warn!(error = %err, "failed to record periodic snapshot time");
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "periodic snapshot failed"),
        }
    }

    fn final_snapshot(&self, vault: &mut Vault, report: &mut RunReport) {
        match vault.snapshot(SnapshotReason::Shutdown, self.clock.now()) {
            Ok(Some(_)) => {
                report.snapshots += 1;
                if let Err(err) = vault.save_checkpoint() {
                    tracing::warn!(error = %err, "failed to record shutdown snapshot time");
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "shutdown snapshot failed"),
        }
    }

    fn deliver(&self, notification: &Notification) -> bool {
        match self.notifier.notify(notification) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(kind = ?notification.kind, error = %err, "notification not delivered");
                false
            }
        }
    }

    fn fail(
        &mut self,
        mut report: RunReport,
        processed: u64,
        accepted: u64,
        err: VaultError,
    ) -> VaultError {
        self.state = RunState::Failed;
        report.state = RunState::Failed;
        report.finished_at = Some(self.clock.now());
        tracing::error!(
            batches = report.batches,
            cursor = ?report.cursor,
            error = %err,
            "ingestion run failed"
        );
        let notification = Notification {
            kind: NotificationKind::Error,
            run_id: report.run_id.clone(),
            state: RunState::Failed,
            started_at: report.started_at,
            sent_at: self.clock.now(),
            total_accepted: accepted,
            processed,
            latest_received_at: None,
            last_backup_at: None,
            error: Some(err.to_string()),
        };
        if self.deliver(&notification) {
            report.notifications += 1;
        }
        self.last_report = Some(report);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ingest::{MemoryRecordSource, NotifyError};
    use crate::vault::Dataset;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    impl Notifier for Recorder {
        fn notify(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Broken;

    impl Notifier for Broken {
        fn notify(&self, _: &Notification) -> std::result::Result<(), NotifyError> {
            Err(NotifyError("smtp down".into()))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap()
    }

    fn ids(prefix: &str, count: usize) -> Vec<Record> {
        (0..count).map(|n| Record::new(format!("{prefix}{n}"))).collect()
    }

    fn fast() -> crate::types::IngestOptionsBuilder {
        IngestOptions::builder().calls_per_second(1_000.0)
    }

    #[test]
    fn progress_notifications_fire_once_per_threshold_crossing() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let options = fast().batch_size(3).notification_threshold(4).build();
        let mut orchestrator =
            Orchestrator::new(dir.path(), MemoryRecordSource::new(ids("m", 10)), options)
                .unwrap()
                .with_clock(Arc::new(ManualClock::new(t0())))
                .with_notifier(Arc::clone(&recorder));

        let report = orchestrator.run().unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.accepted, 10);
        // totals after each batch: 3, 6, 9, 10 -> crossings at 6 (4) and 9 (8)
        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].total_accepted, 6);
        assert_eq!(sent[1].total_accepted, 9);
        assert_eq!(report.notifications, 2);
    }

    #[test]
    fn periodic_backup_fires_after_the_interval() {
        let dir = TempDir::new().unwrap();
        let records = vec![Record::new("a"); 5];
        let options = IngestOptions::builder()
            .batch_size(1)
            .calls_per_second(0.05)
            .backup_interval(Duration::from_secs(60))
            .build();
        let mut orchestrator =
            Orchestrator::new(dir.path(), MemoryRecordSource::new(records), options)
                .unwrap()
                .with_clock(Arc::new(ManualClock::new(t0())))
                .with_notifier(crate::ingest::NoopNotifier);

        let report = orchestrator.run().unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.duplicates, 4);
        assert_eq!(report.snapshots, 2);

        let vault = Vault::open(dir.path()).unwrap();
        let reasons: Vec<_> = vault
            .backups()
            .list()
            .unwrap()
            .into_iter()
            .map(|manifest| manifest.reason)
            .collect();
        assert_eq!(reasons, vec![SnapshotReason::Periodic, SnapshotReason::Shutdown]);
    }

    #[test]
    fn throttling_backs_off_then_fails() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let mut source = MemoryRecordSource::new(ids("m", 3));
        for _ in 0..4 {
            source.push_fault(SourceError::Throttled { retry_after: None });
        }
        let recorder = Arc::new(Recorder::default());
        let options = fast()
            .max_retries(3)
            .base_backoff(Duration::from_secs(1))
            .max_backoff(Duration::from_secs(3))
            .build();
        let mut orchestrator = Orchestrator::new(dir.path(), source, options)
            .unwrap()
            .with_clock(clock.clone())
            .with_notifier(Arc::clone(&recorder));

        match orchestrator.run() {
            Err(VaultError::RetriesExhausted {
                attempts,
                last_delay,
                ..
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_delay, Duration::from_secs(3));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert_eq!(
            clock.sleeps(),
            [1, 2, 3].map(Duration::from_secs).to_vec()
        );
        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Error);
        assert_eq!(orchestrator.last_report().unwrap().retries, 3);

        // The lock was released and nothing was ingested.
        assert!(Vault::open(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn transient_failures_within_budget_recover() {
        let dir = TempDir::new().unwrap();
        let source = MemoryRecordSource::new(ids("m", 2))
            .with_fault(SourceError::Transient("connection reset".into()));
        let mut orchestrator = Orchestrator::new(dir.path(), source, fast().build())
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(t0())))
            .with_notifier(crate::ingest::NoopNotifier);
        let report = orchestrator.run().unwrap();
        assert_eq!(report.retries, 1);
        assert_eq!(report.accepted, 2);
    }

    #[test]
    fn backoff_restarts_for_every_batch() {
        /// Throttles the first attempt at every page.
        struct ThrottleEachPage {
            inner: MemoryRecordSource,
            throttled: Option<Option<String>>,
        }
        impl RecordSource for ThrottleEachPage {
            fn fetch_batch(
                &mut self,
                cursor: Option<&str>,
                max_count: usize,
            ) -> std::result::Result<SourceBatch, SourceError> {
                let page = cursor.map(str::to_string);
                if self.throttled.as_ref() != Some(&page) {
                    self.throttled = Some(page);
                    return Err(SourceError::Throttled { retry_after: None });
                }
                self.inner.fetch_batch(cursor, max_count)
            }
        }

        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let source = ThrottleEachPage {
            inner: MemoryRecordSource::new(ids("m", 6)),
            throttled: None,
        };
        let options = fast()
            .batch_size(2)
            .max_retries(1)
            .base_backoff(Duration::from_secs(2))
            .max_backoff(Duration::from_secs(30))
            .build();
        let mut orchestrator = Orchestrator::new(dir.path(), source, options)
            .unwrap()
            .with_clock(clock.clone())
            .with_notifier(crate::ingest::NoopNotifier);

        let report = orchestrator.run().unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.retries, 3);
        let backoff_sleeps: Vec<_> = clock
            .sleeps()
            .into_iter()
            .filter(|sleep| *sleep >= Duration::from_secs(1))
            .collect();
        assert_eq!(backoff_sleeps, vec![Duration::from_secs(2); 3]);
    }

    #[test]
    fn fatal_source_error_keeps_last_checkpoint() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let options = fast().batch_size(2).build();
        let mut orchestrator =
            Orchestrator::new(dir.path(), MemoryRecordSource::new(ids("m", 4)), options)
                .unwrap()
                .with_clock(clock)
                .with_notifier(Broken);

        let handle = orchestrator.suspend_handle();
        handle.suspend();
        let report = orchestrator.run().unwrap();
        assert_eq!(report.state, RunState::Suspended);
        assert_eq!(report.batches, 0);
        assert!(!handle.is_requested());

        orchestrator
            .source_mut()
            .push_fault(SourceError::Fatal("mailbox deleted".into()));
        assert!(matches!(
            orchestrator.run(),
            Err(VaultError::SourceFatal { .. })
        ));
        // The broken notifier did not mask the source error.
        assert_eq!(orchestrator.last_report().unwrap().notifications, 0);

        let report = orchestrator.run().unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(Dataset::load_from_dir(dir.path()).unwrap().len(), 4);
    }

    #[test]
    fn sender_filter_and_cutoff_screen_candidates() {
        let dir = TempDir::new().unwrap();
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 10, d, 9, 0, 0).unwrap();
        // Newest first, as a mailbox lists them.
        let records = vec![
            Record::new("n1").received_at(day(20)).sender("Alerts <ALERTS@bank.example>"),
            Record::new("n2").received_at(day(19)).sender("spam@junk.example"),
            Record::new("o1").received_at(day(9)).sender("alerts@bank.example"),
            Record::new("n3").received_at(day(18)).sender("alerts@bank.example"),
            Record::new("o2").received_at(day(8)).sender("alerts@bank.example"),
            Record::new("o3").received_at(day(7)).sender("alerts@bank.example"),
            Record::new("n4").received_at(day(17)).sender("alerts@bank.example"),
        ];
        let options = fast()
            .batch_size(10)
            .allow_sender("alerts@bank.example")
            .cutoff(day(10))
            .max_consecutive_stale(2)
            .build();
        let mut orchestrator =
            Orchestrator::new(dir.path(), MemoryRecordSource::new(records), options)
                .unwrap()
                .with_clock(Arc::new(ManualClock::new(t0())))
                .with_notifier(crate::ingest::NoopNotifier);

        let report = orchestrator.run().unwrap();
        assert_eq!(report.state, RunState::Completed);
        let stored: Vec<_> = Dataset::load_from_dir(dir.path())
            .unwrap()
            .ids()
            .map(str::to_string)
            .collect();
        assert_eq!(stored, vec!["n1", "n3"]);
        assert_eq!(report.filtered, 4);
    }

    #[test]
    fn missing_cursor_with_more_pages_is_fatal() {
        struct Stuck;
        impl RecordSource for Stuck {
            fn fetch_batch(
                &mut self,
                _: Option<&str>,
                _: usize,
            ) -> std::result::Result<SourceBatch, SourceError> {
                Ok(SourceBatch {
                    records: Vec::new(),
                    next_cursor: None,
                    has_more: true,
                })
            }
        }
        let dir = TempDir::new().unwrap();
        let mut orchestrator = Orchestrator::new(dir.path(), Stuck, fast().build())
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(t0())))
            .with_notifier(crate::ingest::NoopNotifier);
        assert!(matches!(
            orchestrator.run(),
            Err(VaultError::SourceFatal { .. })
        ));
    }
}
