//! Configuration for ingestion runs and reconciliation.
//!
//! Every struct deserializes from JSON with per-field defaults, so a config file only
//! needs to name what it changes. Durations are stored as integers (seconds or
//! milliseconds, per the field suffix) to keep files hand-editable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKUP_INTERVAL_SECS, DEFAULT_BASE_BACKOFF_MS, DEFAULT_BATCH_SIZE,
    DEFAULT_CALLS_PER_SECOND, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_MAX_CONSECUTIVE_STALE,
    DEFAULT_MAX_RETRIES, DEFAULT_NOTIFICATION_THRESHOLD, DEFAULT_REMOTE_BATCH_SIZE,
    DEFAULT_SNAPSHOTS_KEPT, MIN_CALLS_PER_SECOND,
};
use crate::error::{Result, VaultError};

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_calls_per_second() -> f64 {
    DEFAULT_CALLS_PER_SECOND
}

fn default_notification_threshold() -> u64 {
    DEFAULT_NOTIFICATION_THRESHOLD
}

fn default_backup_interval_secs() -> u64 {
    DEFAULT_BACKUP_INTERVAL_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_base_backoff_ms() -> u64 {
    DEFAULT_BASE_BACKOFF_MS
}

fn default_max_backoff_secs() -> u64 {
    DEFAULT_MAX_BACKOFF_SECS
}

fn default_max_consecutive_stale() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_STALE
}

fn default_remote_batch_size() -> usize {
    DEFAULT_REMOTE_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

/// How many backup snapshots survive pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum RetentionPolicy {
    KeepAll,
    KeepLatest(usize),
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::KeepLatest(DEFAULT_SNAPSHOTS_KEPT)
    }
}

/// Tunables for one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOptions {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Ceiling on record source calls per second.
    #[serde(default = "default_calls_per_second")]
    pub calls_per_second: f64,
    /// A progress notification fires each time the accepted total crosses a multiple of this.
    #[serde(default = "default_notification_threshold")]
    pub notification_threshold: u64,
    #[serde(default = "default_backup_interval_secs")]
    pub backup_interval_secs: u64,
    /// Retries per batch before the run fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub compress_snapshots: bool,
    /// Sender allow-list; a candidate is kept when its sender contains any entry.
    /// Empty keeps everything.
    #[serde(default)]
    pub sender_filter: Vec<String>,
    /// Candidates received before this instant are skipped.
    #[serde(default)]
    pub cutoff: Option<DateTime<Utc>>,
    /// Consecutive pre-cutoff candidates after which the run completes.
    #[serde(default = "default_max_consecutive_stale")]
    pub max_consecutive_stale: u32,
    /// Run the attached reconciler once the source is exhausted.
    #[serde(default = "default_true")]
    pub reconcile_on_complete: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            calls_per_second: DEFAULT_CALLS_PER_SECOND,
            notification_threshold: DEFAULT_NOTIFICATION_THRESHOLD,
            backup_interval_secs: DEFAULT_BACKUP_INTERVAL_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            retention: RetentionPolicy::default(),
            compress_snapshots: false,
            sender_filter: Vec::new(),
            cutoff: None,
            max_consecutive_stale: DEFAULT_MAX_CONSECUTIVE_STALE,
            reconcile_on_complete: true,
        }
    }
}

impl IngestOptions {
    /// Start a fluent builder for `IngestOptions`.
    #[must_use]
    pub fn builder() -> IngestOptionsBuilder {
        IngestOptionsBuilder::default()
    }

    #[must_use]
    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    #[must_use]
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(VaultError::config("batch_size must be at least 1"));
        }
        if !(self.calls_per_second.is_finite() && self.calls_per_second > 0.0) {
            return Err(VaultError::config(
                "calls_per_second must be a positive number",
            ));
        }
        if self.calls_per_second < MIN_CALLS_PER_SECOND {
            return Err(VaultError::config(
                "calls_per_second must allow at least one call per day",
            ));
        }
        if self.notification_threshold == 0 {
            return Err(VaultError::config(
                "notification_threshold must be at least 1",
            ));
        }
        if self.base_backoff_ms > self.max_backoff_secs.saturating_mul(1_000) {
            return Err(VaultError::config(
                "base_backoff_ms must not exceed max_backoff_secs",
            ));
        }
        if self.retention == RetentionPolicy::KeepLatest(0) {
            return Err(VaultError::config(
                "retention must keep at least one snapshot",
            ));
        }
        if self.cutoff.is_some() && self.max_consecutive_stale == 0 {
            return Err(VaultError::config(
                "max_consecutive_stale must be at least 1 when a cutoff is set",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptionsBuilder {
    inner: IngestOptions,
}

impl IngestOptionsBuilder {
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.inner.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn calls_per_second(mut self, calls: f64) -> Self {
        self.inner.calls_per_second = calls;
        self
    }

    #[must_use]
    pub fn notification_threshold(mut self, threshold: u64) -> Self {
        self.inner.notification_threshold = threshold;
        self
    }

    #[must_use]
    pub fn backup_interval(mut self, interval: Duration) -> Self {
        self.inner.backup_interval_secs = interval.as_secs();
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.inner.max_retries = retries;
        self
    }

    #[must_use]
    pub fn base_backoff(mut self, delay: Duration) -> Self {
        self.inner.base_backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.inner.max_backoff_secs = delay.as_secs();
        self
    }

    #[must_use]
    pub fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.inner.retention = policy;
        self
    }

    #[must_use]
    pub fn compress_snapshots(mut self, enabled: bool) -> Self {
        self.inner.compress_snapshots = enabled;
        self
    }

    #[must_use]
    pub fn allow_sender<S: Into<String>>(mut self, sender: S) -> Self {
        self.inner.sender_filter.push(sender.into());
        self
    }

    #[must_use]
    pub fn cutoff(mut self, cutoff: DateTime<Utc>) -> Self {
        self.inner.cutoff = Some(cutoff);
        self
    }

    #[must_use]
    pub fn max_consecutive_stale(mut self, count: u32) -> Self {
        self.inner.max_consecutive_stale = count;
        self
    }

    #[must_use]
    pub fn reconcile_on_complete(mut self, enabled: bool) -> Self {
        self.inner.reconcile_on_complete = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> IngestOptions {
        self.inner
    }
}

/// Tunables for the remote reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Records per `insert_many` call.
    #[serde(default = "default_remote_batch_size")]
    pub remote_batch_size: usize,
    /// Create the remote indexes before the first sync.
    #[serde(default = "default_true")]
    pub ensure_indexes: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            remote_batch_size: DEFAULT_REMOTE_BATCH_SIZE,
            ensure_indexes: true,
        }
    }
}

impl ReconcileOptions {
    pub fn validate(&self) -> Result<()> {
        if self.remote_batch_size == 0 {
            return Err(VaultError::config("remote_batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub ingest: IngestOptions,
    #[serde(default)]
    pub reconcile: ReconcileOptions,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ingest: IngestOptions::default(),
            reconcile: ReconcileOptions::default(),
        }
    }
}

/// `<platform data dir>/mailvault`, falling back to `./mailvault`.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs_next::data_local_dir()
        .map(|dir| dir.join("mailvault"))
        .unwrap_or_else(|| PathBuf::from("mailvault"))
}

impl VaultConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs_err::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ingest.validate()?;
        self.reconcile.validate()
    }
}
