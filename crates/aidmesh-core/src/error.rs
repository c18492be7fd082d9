//! Error types for Aidmesh

use thiserror::Error;

/// Main error type for Aidmesh operations
#[derive(Error, Debug)]
pub enum ReportError {
    /// Payload failed validation; rejected before any matching attempt
    #[error("Validation error: {0}")]
    Validation(String),

    /// Report was not found in storage
    #[error("Report not found: {0}")]
    ReportNotFound(String),

    /// Status change attempted on a report that is already resolved
    #[error("Report already resolved: {0}")]
    AlreadyResolved(String),

    /// Actor's role does not permit the requested status transition
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Network-related error (unreachable peer, failed stream)
    #[error("Network error: {0}")]
    Network(String),

    /// A submission attempt exceeded its per-tier timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Error during storage operations (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Destructive queue clear refused while entries remain unsynced
    #[error("{0} queue entries are not yet synced; clear refused")]
    UnsyncedEntries(usize),

    /// Invalid operation for current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using ReportError
pub type ReportResult<T> = Result<T, ReportError>;

impl ReportError {
    /// Whether this error is transient and the operation is safe to retry
    /// later (requeue / fallback tier), as opposed to a permanent rejection.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReportError::Network(_) | ReportError::Timeout(_))
    }
}
