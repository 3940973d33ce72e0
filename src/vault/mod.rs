//! The local dataset: storage, dedup, checkpoints, snapshots and the merger.

mod backup;
mod checkpoint;
mod dataset;
mod dedup;
mod lifecycle;
mod merge;

pub use backup::{BackupManager, SnapshotCompression, SnapshotManifest, SnapshotReason};
pub use checkpoint::CheckpointStore;
pub use dataset::Dataset;
pub use dedup::DedupIndex;
pub use lifecycle::{Vault, VaultSettings};
