//! Public types exposed by the `mailvault-core` crate.

pub mod checkpoint;
pub mod options;
pub mod record;
pub mod stats;
pub mod sync;

pub use checkpoint::{BatchProgress, Checkpoint};
pub use options::{
    IngestOptions, IngestOptionsBuilder, ReconcileOptions, RetentionPolicy, VaultConfig,
    default_data_dir,
};
pub use record::Record;
pub use stats::{DatasetStats, DateRange, MergeResult, SenderCount};
pub use sync::{ConsistencyReport, SyncReport};
