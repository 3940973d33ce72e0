//! Reconciliation of the local dataset with a remote document store.

mod reconciler;
mod remote;

pub use reconciler::{REMOTE_INDEXES, Reconciler, diff};
pub use remote::{InsertOutcome, MemoryRemoteStore, RemoteError, RemoteStore};
