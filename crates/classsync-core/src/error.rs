//! Error types for classsync

use thiserror::Error;

use crate::remote::RemoteError;

/// Main error type for classsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local persistence backend could not be opened or created
    #[error("Local store unavailable: {0}")]
    StoreUnavailable(String),

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

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote store operation failed (after retries, if any)
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Collection name is not one this build knows about
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Outbox entry references a collection with no remote mapping.
    /// This is a configuration defect; the entry stays pending.
    #[error("Collection '{collection}' has no remote mapping (outbox entry #{sequence})")]
    UnresolvedCollection { collection: String, sequence: u64 },

    /// Query filters or orders by a field the collection does not index
    #[error("Field '{field}' is not indexed on collection '{collection}'")]
    UndeclaredIndex { collection: String, field: String },

    /// Record was not found in the local store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Session operation needs a logged-in user
    #[error("No user is logged in")]
    NotLoggedIn,

    /// Invalid operation for current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::UnresolvedCollection {
            collection: "grades".to_string(),
            sequence: 7,
        };
        assert_eq!(
            format!("{}", err),
            "Collection 'grades' has no remote mapping (outbox entry #7)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let sync_err: SyncError = io_err.into();
        assert!(matches!(sync_err, SyncError::Io(_)));
    }

    #[test]
    fn test_error_from_remote() {
        let sync_err: SyncError = RemoteError::Unavailable("offline".to_string()).into();
        assert!(matches!(sync_err, SyncError::Remote(_)));
    }
}
