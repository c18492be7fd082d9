//! Offline mutation queue: durable, strictly ordered, at-least-once.
//!
//! Operations performed while no route exists are appended here and
//! replayed strictly in sequence once connectivity returns. Entries are
//! pruned only after their canonical mapping is persisted; a failed replay
//! leaves the entry queued with capped backoff. If durable storage itself
//! fails, only that operation's durability is lost: the queue degrades to
//! an in-memory buffer instead of crashing the device.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{ReportError, ReportResult};
use crate::router::{ReplayOutcome, SubmissionRouter};
use crate::storage::Storage;
use crate::types::connectivity::ConnectivityState;
use crate::types::queue::{OfflineQueueItem, QueueOperation};
use crate::types::LocalId;

/// Sequence region reserved for in-memory fallback entries, so they sort
/// after everything the durable log ever assigned.
const MEMORY_SEQUENCE_BASE: u64 = u64::MAX / 2;

/// The device's offline mutation queue.
pub struct OfflineQueue {
    storage: Storage,
    /// Best-effort buffer used only when the durable log fails
    memory: Mutex<MemoryBuffer>,
}

struct MemoryBuffer {
    items: VecDeque<OfflineQueueItem>,
    next_sequence: u64,
}

impl OfflineQueue {
    /// Create a queue over the device's storage.
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            memory: Mutex::new(MemoryBuffer {
                items: VecDeque::new(),
                next_sequence: MEMORY_SEQUENCE_BASE,
            }),
        }
    }

    /// Append an operation.
    ///
    /// A durability failure is fatal to that entry's durability only: the
    /// entry is kept in memory and the queue keeps working.
    pub fn enqueue(
        &self,
        local_id: LocalId,
        operation: QueueOperation,
    ) -> ReportResult<OfflineQueueItem> {
        match self.storage.enqueue_operation(local_id, operation.clone()) {
            Ok(item) => Ok(item),
            Err(e) => {
                warn!(error = %e, "Queue durability failure; keeping entry in memory");
                let mut memory = self.memory.lock();
                let sequence = memory.next_sequence;
                memory.next_sequence += 1;
                let item = OfflineQueueItem::new(local_id, sequence, operation);
                memory.items.push_back(item.clone());
                Ok(item)
            }
        }
    }

    /// All pending items in replay order (durable entries first, then any
    /// in-memory fallback entries).
    pub fn items(&self) -> ReportResult<Vec<OfflineQueueItem>> {
        let mut items = self.storage.queue_items()?;
        items.extend(self.memory.lock().items.iter().cloned());
        Ok(items)
    }

    /// Number of pending (unsynced) entries.
    pub fn len(&self) -> ReportResult<usize> {
        Ok(self.storage.queue_len()? + self.memory.lock().items.len())
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> ReportResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Persist updated attempt bookkeeping.
    pub fn update(&self, item: &OfflineQueueItem) -> ReportResult<()> {
        if item.sequence >= MEMORY_SEQUENCE_BASE {
            let mut memory = self.memory.lock();
            if let Some(slot) = memory
                .items
                .iter_mut()
                .find(|i| i.sequence == item.sequence)
            {
                *slot = item.clone();
            }
            Ok(())
        } else {
            self.storage.update_queue_item(item)
        }
    }

    /// Prune an entry after its canonical mapping is persisted.
    pub fn remove(&self, sequence: u64) -> ReportResult<()> {
        if sequence >= MEMORY_SEQUENCE_BASE {
            self.memory.lock().items.retain(|i| i.sequence != sequence);
            Ok(())
        } else {
            self.storage.remove_queue_entry(sequence)
        }
    }

    /// Destructive clear of the local queue.
    ///
    /// Refused while any entry remains unsynced; every queued entry is by
    /// definition unsynced, so this only succeeds on an empty queue.
    pub fn clear(&self) -> ReportResult<()> {
        let pending = self.len()?;
        if pending > 0 {
            return Err(ReportError::UnsyncedEntries(pending));
        }
        self.storage.clear_queue()?;
        self.memory.lock().items.clear();
        Ok(())
    }
}

/// Sequential background drainer for an [`OfflineQueue`].
///
/// One drain task per device: replay order is preserved by replaying
/// entries one at a time and stopping the pass at the first transient
/// failure. Draining triggers on a periodic timer and on every
/// connectivity transition that opens a route.
pub struct QueueDrainer {
    task: JoinHandle<()>,
}

impl QueueDrainer {
    /// Spawn the drain task.
    pub fn spawn(
        queue: Arc<OfflineQueue>,
        router: Arc<SubmissionRouter>,
        config: SyncConfig,
        mut transitions: broadcast::Receiver<ConnectivityState>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.drain_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = Self::drain(&queue, &router, &config).await {
                            warn!(error = %e, "Queue drain pass failed");
                        }
                    }
                    result = transitions.recv() => {
                        match result {
                            Ok(state) if state.any_route() => {
                                info!(%state, "Connectivity regained; draining queue");
                                if let Err(e) = Self::drain(&queue, &router, &config).await {
                                    warn!(error = %e, "Queue drain pass failed");
                                }
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                debug!(missed = n, "Connectivity transitions lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });
        Self { task }
    }

    /// One drain pass: replay entries strictly in sequence.
    ///
    /// - Canonical result: prune the entry (mapping already persisted).
    /// - Relayed create: keep the entry (at-least-once until a canonical
    ///   mapping exists; the dedup engine makes the eventual re-submission
    ///   idempotent), but stamp the attempt so it backs off.
    /// - Relayed update: prune; the host's durable cache now carries it.
    /// - Transient failure: stamp the attempt and stop the pass, preserving
    ///   replay order.
    /// - Permanent rejection: drop the entry with a warning; it would
    ///   otherwise block the queue forever.
    pub async fn drain(
        queue: &OfflineQueue,
        router: &SubmissionRouter,
        config: &SyncConfig,
    ) -> ReportResult<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut processed = 0usize;

        for mut item in queue.items()? {
            if let Some(last) = item.last_attempt_at {
                let wait = config.backoff_for(item.sync_attempts).as_millis() as i64;
                if now < last + wait {
                    debug!(sequence = item.sequence, "Entry still backing off; stopping pass");
                    break;
                }
            }

            match router.replay(&item.operation).await {
                Ok(ReplayOutcome::Canonical(report)) => {
                    debug!(sequence = item.sequence, id = %report.id, "Entry synced");
                    queue.remove(item.sequence)?;
                    processed += 1;
                }
                Ok(ReplayOutcome::Relayed(_)) => match &item.operation {
                    QueueOperation::StatusUpdate { .. } => {
                        debug!(sequence = item.sequence, "Update relayed to host");
                        queue.remove(item.sequence)?;
                        processed += 1;
                    }
                    QueueOperation::Create { .. } => {
                        debug!(sequence = item.sequence, "Create relayed; awaiting canonical id");
                        item.sync_attempts += 1;
                        item.last_attempt_at = Some(now);
                        queue.update(&item)?;
                        processed += 1;
                    }
                },
                Err(e) if e.is_transient() => {
                    debug!(sequence = item.sequence, error = %e, "Replay failed; stopping pass");
                    item.sync_attempts += 1;
                    item.last_attempt_at = Some(now);
                    queue.update(&item)?;
                    break;
                }
                Err(e) => {
                    warn!(
                        sequence = item.sequence,
                        op = item.operation.label(),
                        error = %e,
                        "Entry permanently rejected; dropping"
                    );
                    queue.remove(item.sequence)?;
                }
            }
        }

        Ok(processed)
    }

    /// Stop the drain task.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::report::{Location, NewReport, ReportType};
    use crate::types::UserId;
    use tempfile::TempDir;

    fn queue() -> (OfflineQueue, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path().join("device.redb")).unwrap();
        (OfflineQueue::new(storage), temp)
    }

    fn create_op(user: &str) -> QueueOperation {
        QueueOperation::Create {
            payload: NewReport::new(
                UserId::new(user),
                ReportType::Other,
                Location::new(0.0, 0.0, "x"),
                "m",
            ),
        }
    }

    #[test]
    fn test_enqueue_and_order() {
        let (queue, _temp) = queue();
        for i in 0..4 {
            queue
                .enqueue(LocalId::new(), create_op(&format!("u{}", i)))
                .unwrap();
        }
        let items = queue.items().unwrap();
        assert_eq!(items.len(), 4);
        assert!(items.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[test]
    fn test_clear_refused_while_entries_pending() {
        let (queue, _temp) = queue();
        queue.enqueue(LocalId::new(), create_op("u1")).unwrap();

        match queue.clear() {
            Err(ReportError::UnsyncedEntries(n)) => assert_eq!(n, 1),
            other => panic!("expected UnsyncedEntries, got {:?}", other),
        }

        // Still there
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_clear_succeeds_when_empty() {
        let (queue, _temp) = queue();
        assert!(queue.clear().is_ok());
    }

    #[test]
    fn test_remove_prunes_entry() {
        let (queue, _temp) = queue();
        let item = queue.enqueue(LocalId::new(), create_op("u1")).unwrap();
        queue.remove(item.sequence).unwrap();
        assert!(queue.is_empty().unwrap());
        assert!(queue.clear().is_ok());
    }

    #[test]
    fn test_memory_fallback_entries_sort_last() {
        let (queue, _temp) = queue();
        let durable = queue.enqueue(LocalId::new(), create_op("u1")).unwrap();

        // Simulate a durability failure by pushing into the fallback
        // buffer directly.
        {
            let mut memory = queue.memory.lock();
            let sequence = memory.next_sequence;
            memory.next_sequence += 1;
            memory
                .items
                .push_back(OfflineQueueItem::new(LocalId::new(), sequence, create_op("u2")));
        }

        let items = queue.items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sequence, durable.sequence);
        assert!(items[1].sequence >= MEMORY_SEQUENCE_BASE);

        queue.remove(items[1].sequence).unwrap();
        assert_eq!(queue.len().unwrap(), 1);
    }
}
