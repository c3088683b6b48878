//! Store error handling
//!
//! Provides typed errors for record and attachment operations so callers can
//! tell a missing row apart from an engine fault.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Requested id or position has no corresponding row
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// The engine did not complete a write (sentinel id, wrong row count)
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Operation is not allowed in the entity's current state
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create or access a path used by the store
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Attachment payload could not be released
    #[error("Failed to release payload '{payload}': {source}")]
    PayloadRelease {
        payload: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Shorthand for a missing entity row
    pub fn find_not_found(id: i64) -> Self {
        StoreError::NotFound {
            what: "find",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing attachment
    pub fn attachment_not_found(id: impl ToString) -> Self {
        StoreError::NotFound {
            what: "attachment",
            id: id.to_string(),
        }
    }

    /// Check if this error means the requested row does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Check if this error is an engine fault
    ///
    /// Fatal errors will not converge under blind retries; callers should
    /// back off or surface them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::StorageFailure(_) | StoreError::Database(_) | StoreError::Io { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseCorrupt =>
            {
                Some("The database file is corrupted. Restore it from a backup or start fresh.")
            }
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DiskFull =>
            {
                Some("Free up disk space and try again.")
            }
            StoreError::Io { .. } => {
                Some("Check that the data directory exists and you have write permissions.")
            }
            StoreError::PayloadRelease { .. } => {
                Some("The attachment file could not be removed. Check its permissions and retry.")
            }
            _ => None,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
