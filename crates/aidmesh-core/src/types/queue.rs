//! Offline mutation queue entry types

use serde::{Deserialize, Serialize};

use crate::types::report::{NewReport, ReportStatus};
use crate::types::{LocalId, ReportRef, UserId};

/// A local operation awaiting replay against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum QueueOperation {
    /// Create a new report
    Create {
        /// The submission payload, including its temporary id
        payload: NewReport,
    },
    /// Apply a status transition to an existing report
    StatusUpdate {
        /// Canonical or temporary id of the target report
        target: ReportRef,
        /// The status to set
        status: ReportStatus,
        /// Who made the transition
        actor: UserId,
        /// Unix timestamp (milliseconds) of the transition on the device
        timestamp: i64,
    },
}

impl QueueOperation {
    /// Short label for logging
    pub fn label(&self) -> &'static str {
        match self {
            QueueOperation::Create { .. } => "create",
            QueueOperation::StatusUpdate { .. } => "statusUpdate",
        }
    }
}

/// One durable entry in the offline mutation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineQueueItem {
    /// Local id of the operation (for creates, the report's temp id)
    pub local_id: LocalId,
    /// Monotonically increasing replay position
    pub sequence: u64,
    /// The queued operation
    pub operation: QueueOperation,
    /// How many replay attempts have failed so far
    pub sync_attempts: u32,
    /// Unix timestamp (milliseconds) of the last attempt, if any
    pub last_attempt_at: Option<i64>,
}

impl OfflineQueueItem {
    /// Wrap an operation at the given replay position.
    pub fn new(local_id: LocalId, sequence: u64, operation: QueueOperation) -> Self {
        Self {
            local_id,
            sequence,
            operation,
            sync_attempts: 0,
            last_attempt_at: None,
        }
    }
}
