//! Progress and error notifications emitted by the orchestrator.
//!
//! Delivery is best-effort: a failing notifier is logged and ingestion carries on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::orchestrator::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Progress,
    Error,
}

/// Snapshot of a run, rendered into a subject and body for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub run_id: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
    /// Records accepted into the dataset over the vault's lifetime.
    pub total_accepted: u64,
    /// Candidates consumed over the vault's lifetime.
    pub processed: u64,
    pub latest_received_at: Option<DateTime<Utc>>,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Notification {
    #[must_use]
    pub fn subject(&self) -> String {
        match self.kind {
            NotificationKind::Progress => {
                format!("Mail ingestion progress: {} messages", self.total_accepted)
            }
            NotificationKind::Error => "Mail ingestion error".to_string(),
        }
    }

    #[must_use]
    pub fn body(&self) -> String {
        let fmt = |at: Option<DateTime<Utc>>| {
            at.map_or_else(|| "never".to_string(), |at| at.to_rfc3339())
        };
        match self.kind {
            NotificationKind::Progress => format!(
                "Run {}\nMessages stored: {}\nCandidates processed: {}\nLatest message date: {}\nStarted: {}\nState: {:?}\nLast backup: {}",
                self.run_id,
                self.total_accepted,
                self.processed,
                fmt(self.latest_received_at),
                self.started_at.to_rfc3339(),
                self.state,
                fmt(self.last_backup_at),
            ),
            NotificationKind::Error => format!(
                "Run {}\nError: {}\nStarted: {}\nCandidates processed before the error: {}",
                self.run_id,
                self.error.as_deref().unwrap_or("unknown"),
                self.started_at.to_rfc3339(),
                self.processed,
            ),
        }
    }
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        (**self).notify(notification)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        (**self).notify(notification)
    }
}

/// Writes notifications to the `tracing` pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification.kind {
            NotificationKind::Progress => tracing::info!(
                run_id = %notification.run_id,
                subject = %notification.subject(),
                body = %notification.body(),
                "notification"
            ),
            NotificationKind::Error => tracing::error!(
                run_id = %notification.run_id,
                subject = %notification.subject(),
                body = %notification.body(),
                "notification"
            ),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: NotificationKind) -> Notification {
        let at = Utc::now();
        Notification {
            kind,
            run_id: "run-1".into(),
            state: RunState::Running,
            started_at: at,
            sent_at: at,
            total_accepted: 2000,
            processed: 2100,
            latest_received_at: None,
            last_backup_at: Some(at),
            error: Some("disk full".into()),
        }
    }

    #[test]
    fn progress_rendering() {
        let note = sample(NotificationKind::Progress);
        assert_eq!(note.subject(), "Mail ingestion progress: 2000 messages");
        let body = note.body();
        assert!(body.contains("Messages stored: 2000"));
        assert!(body.contains("Latest message date: never"));
        assert!(body.contains("State: Running"));
    }

    #[test]
    fn error_rendering() {
        let note = sample(NotificationKind::Error);
        assert_eq!(note.subject(), "Mail ingestion error");
        let body = note.body();
        assert!(body.contains("Error: disk full"));
        assert!(body.contains("before the error: 2100"));
        assert!(TracingNotifier.notify(&note).is_ok());
    }
}
