//! Background ingestion: record sources, pacing, retries, notifications and the loop.

mod notify;
mod orchestrator;
mod rate;
mod retry;
mod source;

pub use notify::{
    NoopNotifier, Notification, NotificationKind, Notifier, NotifyError, TracingNotifier,
};
pub use orchestrator::{Orchestrator, RunReport, RunState, SuspendHandle};
pub use rate::RateLimiter;
pub use retry::Backoff;
pub use source::{MemoryRecordSource, RecordSource, SourceBatch, SourceError};
