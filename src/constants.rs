//! Defaults and on-disk names shared across the crate.

/// Envelope `format` tag of the dataset file.
pub const DATASET_FORMAT: &str = "mailvault/dataset";
/// Envelope `format` tag of the checkpoint file.
pub const CHECKPOINT_FORMAT: &str = "mailvault/checkpoint";
/// Envelope `format` tag of a snapshot manifest.
pub const SNAPSHOT_FORMAT: &str = "mailvault/snapshot";
/// Current envelope version; readers reject newer versions.
pub const FORMAT_VERSION: u32 = 1;

pub const DATASET_FILE: &str = "dataset.json";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const LOCK_FILE: &str = "vault.lock";
pub const BACKUP_DIR: &str = "backups";
pub const SNAPSHOT_MANIFEST_FILE: &str = "manifest.json";
pub const SNAPSHOT_DATASET_FILE: &str = "dataset.json";
pub const SNAPSHOT_DATASET_FILE_ZSTD: &str = "dataset.json.zst";
pub const SNAPSHOT_CHECKPOINT_FILE: &str = "checkpoint.json";

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_CALLS_PER_SECOND: f64 = 2.0;
/// Slowest accepted source call rate: one call per day.
pub const MIN_CALLS_PER_SECOND: f64 = 1.0 / 86_400.0;
pub const DEFAULT_NOTIFICATION_THRESHOLD: u64 = 1_000;
pub const DEFAULT_BACKUP_INTERVAL_SECS: u64 = 1_800;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;
pub const DEFAULT_REMOTE_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_CONSECUTIVE_STALE: u32 = 5;
pub const DEFAULT_SNAPSHOTS_KEPT: usize = 48;
pub const ZSTD_LEVEL: i32 = 3;

/// Number of senders reported by dataset statistics.
pub const TOP_SENDERS: usize = 5;
