#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal helpers are self-describing; public APIs carry docs
// where the behaviour is not obvious from the signature.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Counts are usize in memory and u64 on disk; values are bounded by mailbox sizes.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]
//
// Style
#![allow(clippy::too_many_lines)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)] // builders and merges take owned records
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::unnecessary_wraps)]

//! Crash-resumable incremental mailbox ingestion.
//!
//! A [`RecordSource`] is paged by the [`Orchestrator`] into a [`Vault`]: a locked data
//! directory holding a checksummed dataset, a checkpoint and read-only snapshots. The
//! [`Reconciler`] then pushes whatever the remote store is missing.

/// The mailvault-core crate version (matches `Cargo.toml`).
pub const MAILVAULT_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod clock;
pub mod constants;
pub mod error;
pub mod ingest;
pub mod io;
pub mod sync;
pub mod text;
pub mod types;
pub mod vault;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, VaultError};
pub use ingest::{
    Backoff, MemoryRecordSource, NoopNotifier, Notification, NotificationKind, Notifier,
    NotifyError, Orchestrator, RateLimiter, RecordSource, RunReport, RunState, SourceBatch,
    SourceError, SuspendHandle, TracingNotifier,
};
pub use sync::{InsertOutcome, MemoryRemoteStore, Reconciler, RemoteError, RemoteStore, diff};
pub use text::{StructuredBody, clean_body, extract_urls, parse_mail_date, structure_body};
pub use types::{
    BatchProgress, Checkpoint, ConsistencyReport, DatasetStats, DateRange, IngestOptions,
    IngestOptionsBuilder, MergeResult, ReconcileOptions, Record, RetentionPolicy, SenderCount,
    SyncReport, VaultConfig, default_data_dir,
};
pub use vault::{
    BackupManager, CheckpointStore, Dataset, DedupIndex, SnapshotCompression, SnapshotManifest,
    SnapshotReason, Vault, VaultSettings,
};
