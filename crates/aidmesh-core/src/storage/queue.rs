//! Offline mutation queue tables.
//!
//! Entries are keyed by their big-endian-ordered u64 sequence number, so
//! redb's key iteration order IS replay order. The next sequence number is
//! persisted in a one-row meta table and assigned inside the same write
//! transaction as the entry, keeping the counter and the log consistent.

use redb::{ReadableTable, TableDefinition};

use super::Storage;
use crate::error::{ReportError, ReportResult};
use crate::types::queue::{OfflineQueueItem, QueueOperation};
use crate::types::LocalId;

pub(super) const QUEUE_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("offline_queue");
pub(super) const QUEUE_META_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("offline_queue_meta");

const NEXT_SEQUENCE_KEY: &str = "next_sequence";

impl Storage {
    /// Append an operation to the offline queue, assigning the next
    /// sequence number.
    pub fn enqueue_operation(
        &self,
        local_id: LocalId,
        operation: QueueOperation,
    ) -> ReportResult<OfflineQueueItem> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let item = {
            let mut meta = write_txn.open_table(QUEUE_META_TABLE)?;
            let sequence = meta
                .get(NEXT_SEQUENCE_KEY)?
                .map(|v| v.value())
                .unwrap_or(0);
            meta.insert(NEXT_SEQUENCE_KEY, sequence + 1)?;

            let item = OfflineQueueItem::new(local_id, sequence, operation);
            let mut table = write_txn.open_table(QUEUE_TABLE)?;
            let data = serde_json::to_vec(&item)
                .map_err(|e| ReportError::Serialization(e.to_string()))?;
            table.insert(sequence, data.as_slice())?;
            item
        };
        write_txn.commit()?;
        Ok(item)
    }

    /// Load all queued items in replay (sequence) order.
    pub fn queue_items(&self) -> ReportResult<Vec<OfflineQueueItem>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(QUEUE_TABLE)?;

        let mut items = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let item: OfflineQueueItem = serde_json::from_slice(value.value())
                .map_err(|e| ReportError::Serialization(e.to_string()))?;
            items.push(item);
        }
        Ok(items)
    }

    /// Persist updated attempt bookkeeping for a queued item.
    pub fn update_queue_item(&self, item: &OfflineQueueItem) -> ReportResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(QUEUE_TABLE)?;
            let data = serde_json::to_vec(item)
                .map_err(|e| ReportError::Serialization(e.to_string()))?;
            table.insert(item.sequence, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove a queue entry once its canonical mapping is persisted.
    pub fn remove_queue_entry(&self, sequence: u64) -> ReportResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(QUEUE_TABLE)?;
            table.remove(sequence)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Number of entries currently queued.
    pub fn queue_len(&self) -> ReportResult<usize> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(QUEUE_TABLE)?;
        let mut count = 0usize;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove every queue entry. The precondition (no unsynced entries) is
    /// checked by the queue layer, not here.
    pub fn clear_queue(&self) -> ReportResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(QUEUE_TABLE)?;
            // retain() over an empty predicate is not available; drain keys
            let keys: Vec<u64> = {
                let mut ks = Vec::new();
                for entry in table.iter()? {
                    let (k, _) = entry?;
                    ks.push(k.value());
                }
                ks
            };
            for k in keys {
                table.remove(k)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}
