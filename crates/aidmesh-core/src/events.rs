//! Event propagation channel
//!
//! Best-effort fan-out to currently connected viewers. An event is a cache
//! invalidation hint ("report X changed; refetch or merge locally"), never
//! the sole source of truth; periodic polling is the correctness backstop
//! for events missed during disconnection. There is no replay log; lagged
//! receivers simply lose events.

use tokio::sync::broadcast;

use crate::types::{GroupId, ReportId, ReportRef};

/// Default capacity for the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted when canonical or hosted report state changes
#[derive(Debug, Clone)]
pub enum ReportEvent {
    /// A new canonical report was accepted by the backend
    Created {
        /// The new report
        id: ReportId,
    },
    /// A merge or status update changed an existing canonical report
    Changed {
        /// The changed report
        id: ReportId,
    },
    /// A hosted record changed on a group host (scoped to connected peers)
    GroupChanged {
        /// The host's group
        group: GroupId,
        /// The changed record, by canonical or temporary id
        report: ReportRef,
    },
}

impl ReportEvent {
    /// The canonical report id this event refers to, if it has one
    pub fn report_id(&self) -> Option<ReportId> {
        match self {
            ReportEvent::Created { id } | ReportEvent::Changed { id } => Some(*id),
            ReportEvent::GroupChanged { report, .. } => match report {
                ReportRef::Canonical(id) => Some(*id),
                ReportRef::Local(_) => None,
            },
        }
    }
}

/// Broadcast channel for report change events.
///
/// Cheap to clone; all clones share the same set of subscribers.
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<ReportEvent>,
}

impl EventChannel {
    /// Create a channel with the default capacity
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to report events.
    ///
    /// Multiple subscribers can exist; events are broadcast to all.
    pub fn subscribe(&self) -> broadcast::Receiver<ReportEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers.
    ///
    /// Sending to zero subscribers is not an error; the event is dropped.
    pub fn emit(&self, event: ReportEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}
