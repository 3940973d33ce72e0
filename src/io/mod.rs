//! On-disk primitives: checksummed envelopes and the directory lock.

pub mod envelope;
pub mod lock;

pub use lock::DirLock;
