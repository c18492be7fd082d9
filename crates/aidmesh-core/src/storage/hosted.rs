//! Hosted cache tables.
//!
//! The hosted cache is the store-of-record for a group host serving peers
//! while offline. Records are keyed by canonical id once synced, by origin
//! (temp) id before that; when a record gains its canonical id the entry is
//! re-keyed in a single transaction.

use redb::{ReadableTable, TableDefinition};

use super::Storage;
use crate::error::{ReportError, ReportResult};
use crate::types::hosted::HostedReportRecord;
use crate::types::GroupId;

pub(super) const HOSTED_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("hosted_reports");

impl Storage {
    /// Save (or overwrite) a hosted record under its current key.
    pub fn save_hosted(&self, record: &HostedReportRecord) -> ReportResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(HOSTED_TABLE)?;
            let data = serde_json::to_vec(record)
                .map_err(|e| ReportError::Serialization(e.to_string()))?;
            let key = record.key();
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a hosted record by key (canonical or origin id string).
    pub fn load_hosted(&self, key: &str) -> ReportResult<Option<HostedReportRecord>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(HOSTED_TABLE)?;

        match table.get(key)? {
            Some(v) => {
                let record: HostedReportRecord = serde_json::from_slice(v.value())
                    .map_err(|e| ReportError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// All hosted records for a group.
    pub fn list_hosted(&self, group: &GroupId) -> ReportResult<Vec<HostedReportRecord>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(HOSTED_TABLE)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: HostedReportRecord = serde_json::from_slice(value.value())
                .map_err(|e| ReportError::Serialization(e.to_string()))?;
            if &record.group == group {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Hosted records for a group the backend has not yet acknowledged.
    pub fn unsynced_hosted(&self, group: &GroupId) -> ReportResult<Vec<HostedReportRecord>> {
        Ok(self
            .list_hosted(group)?
            .into_iter()
            .filter(|r| !r.synced_to_backend)
            .collect())
    }

    /// Replace a hosted record, moving it from `old_key` to its current key
    /// in one transaction (used when a record gains its canonical id).
    pub fn replace_hosted(&self, old_key: &str, record: &HostedReportRecord) -> ReportResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(HOSTED_TABLE)?;
            table.remove(old_key)?;
            let data = serde_json::to_vec(record)
                .map_err(|e| ReportError::Serialization(e.to_string()))?;
            let key = record.key();
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove a hosted record.
    pub fn remove_hosted(&self, key: &str) -> ReportResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(HOSTED_TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
