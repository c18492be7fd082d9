//! Persistent storage using redb.
//!
//! This module provides ACID-compliant storage for:
//! - Canonical reports (the backend's report store)
//! - The temp-id → canonical-id origin index
//! - The offline mutation queue (per device)
//! - The hosted cache (per hosting device)
//!
//! The same `Storage` type backs all three roles; each role only touches
//! its own tables.

use crate::error::{ReportError, ReportResult};
use crate::types::report::Report;
use crate::types::{LocalId, ReportId, UserId};
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

// Submodules
mod hosted;
mod queue;

use hosted::HOSTED_TABLE;
use queue::{QUEUE_META_TABLE, QUEUE_TABLE};

// Table definitions
const REPORTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("reports");
const ORIGIN_INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("origin_index");
const ENDPOINT_SECRET_KEY_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("endpoint_secret_key");

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
}

impl Storage {
    /// Get a reference to the shared database handle
    pub fn db_handle(&self) -> Arc<RwLock<Database>> {
        self.db.clone()
    }

    /// Create a new storage instance at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file
    /// - Create all required tables
    pub fn new(path: impl AsRef<Path>) -> ReportResult<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Open/create database
        let db = Database::create(path)?;

        // Initialize all tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(REPORTS_TABLE)?;
            let _ = write_txn.open_table(ORIGIN_INDEX_TABLE)?;
            let _ = write_txn.open_table(QUEUE_TABLE)?;
            let _ = write_txn.open_table(QUEUE_META_TABLE)?;
            let _ = write_txn.open_table(HOSTED_TABLE)?;
            let _ = write_txn.open_table(ENDPOINT_SECRET_KEY_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Report Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Save a canonical report.
    ///
    /// If a report with the same id already exists, it will be overwritten.
    pub fn save_report(&self, report: &Report) -> ReportResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(REPORTS_TABLE)?;
            let data = serde_json::to_vec(report)
                .map_err(|e| ReportError::Serialization(e.to_string()))?;
            let key = report.id.to_string_repr();
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a single report by id.
    ///
    /// Returns `None` if no report with the given id exists.
    pub fn load_report(&self, id: &ReportId) -> ReportResult<Option<Report>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(REPORTS_TABLE)?;
        let key = id.to_string_repr();

        match table.get(key.as_str())? {
            Some(v) => {
                let report: Report = serde_json::from_slice(v.value())
                    .map_err(|e| ReportError::Serialization(e.to_string()))?;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    /// Load all reports.
    pub fn list_reports(&self) -> ReportResult<Vec<Report>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(REPORTS_TABLE)?;

        let mut reports = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let report: Report = serde_json::from_slice(value.value())
                .map_err(|e| ReportError::Serialization(e.to_string()))?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Load all reports by the given author with the given kind.
    ///
    /// Dedup candidate lookup: the engine narrows these further by location
    /// cell and time window.
    pub fn reports_by_author_kind(
        &self,
        user: &UserId,
        kind: crate::types::report::ReportType,
    ) -> ReportResult<Vec<Report>> {
        let reports = self.list_reports()?;
        Ok(reports
            .into_iter()
            .filter(|r| &r.user == user && r.kind == kind)
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Origin Index Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Record the temp-id → canonical-id mapping for a synced report.
    ///
    /// The first mapping for a temp id wins: a temp id maps to at most one
    /// canonical id, so a replay that raced another copy gets the already
    /// recorded canonical id back instead of overwriting it.
    pub fn record_origin(&self, local: &LocalId, canonical: &ReportId) -> ReportResult<ReportId> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let effective = {
            let mut table = write_txn.open_table(ORIGIN_INDEX_TABLE)?;
            let key = local.to_string_repr();
            let existing = table
                .get(key.as_str())?
                .map(|v| v.value().to_string());
            match existing {
                Some(prior) => ReportId::from_string(&prior)
                    .map_err(|e| ReportError::Serialization(e.to_string()))?,
                None => {
                    let value = canonical.to_string_repr();
                    table.insert(key.as_str(), value.as_str())?;
                    *canonical
                }
            }
        };
        write_txn.commit()?;
        Ok(effective)
    }

    /// Look up the canonical id a temp id was mapped to, if any.
    pub fn lookup_origin(&self, local: &LocalId) -> ReportResult<Option<ReportId>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ORIGIN_INDEX_TABLE)?;
        let key = local.to_string_repr();

        match table.get(key.as_str())? {
            Some(v) => {
                let id = ReportId::from_string(v.value())
                    .map_err(|e| ReportError::Serialization(e.to_string()))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Endpoint Secret Key Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Endpoint secret key storage key (there's only one endpoint per device)
    const ENDPOINT_SECRET_KEY: &'static str = "endpoint_secret_key";

    /// Save the endpoint's secret key, keeping the host id stable across
    /// restarts so shared tickets stay valid.
    pub fn save_endpoint_secret_key(&self, secret_key: &[u8; 32]) -> ReportResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENDPOINT_SECRET_KEY_TABLE)?;
            table.insert(Self::ENDPOINT_SECRET_KEY, secret_key.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load the endpoint's secret key, if one was generated before.
    pub fn load_endpoint_secret_key(&self) -> ReportResult<Option<[u8; 32]>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ENDPOINT_SECRET_KEY_TABLE)?;

        match table.get(Self::ENDPOINT_SECRET_KEY)? {
            Some(v) => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(v.value());
                Ok(Some(arr))
            }
            None => Ok(None),
        }
    }
}
