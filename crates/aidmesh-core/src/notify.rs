//! Notification dispatch collaborator.
//!
//! The backend hands a title/body/data payload to a [`Notifier`] after every
//! accepted create or merge-producing update. Dispatch failures are logged
//! and never fail the report operation; delivery guarantees are out of
//! scope.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::ReportResult;
use crate::types::report::Report;

/// Payload handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Short headline
    pub title: String,
    /// Longer text
    pub body: String,
    /// Structured payload for the receiving client
    pub data: Value,
}

impl Notification {
    /// Build the standard "new report" notification.
    pub fn report_created(report: &Report) -> Self {
        Self {
            title: format!("New {} report", report.kind),
            body: report.message.clone(),
            data: serde_json::json!({
                "reportId": report.id.to_string_repr(),
                "type": report.kind,
                "status": report.status,
            }),
        }
    }

    /// Build the standard "status changed" notification.
    pub fn status_changed(report: &Report) -> Self {
        Self {
            title: format!("{} report is now {}", report.kind, report.status),
            body: report.location.description.clone(),
            data: serde_json::json!({
                "reportId": report.id.to_string_repr(),
                "status": report.status,
            }),
        }
    }
}

/// Where notifications go. Implementations must not block report ingestion.
pub trait Notifier: Send + Sync {
    /// Dispatch one notification. Errors are reported to the caller, which
    /// logs and discards them.
    fn dispatch(&self, notification: Notification) -> ReportResult<()>;
}

/// Default notifier: logs the notification and does nothing else.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn dispatch(&self, notification: Notification) -> ReportResult<()> {
        info!(title = %notification.title, "Notification dispatched");
        Ok(())
    }
}

/// Dispatch through the given notifier, swallowing (but logging) failures.
pub fn dispatch_best_effort(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.dispatch(notification) {
        warn!(error = %e, "Notification dispatch failed (ignored)");
    }
}
