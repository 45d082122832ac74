//! Error types for the fieldlog core.

use fieldlog_storage::StorageError;
use fieldlog_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in store, queue and persistence operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The store image could not be loaded or created. Fatal for `open`.
    #[error("storage initialization failed: {message}")]
    StorageInit {
        /// Description of the failure.
        message: String,
    },

    /// Saving the image through the persistence adapter failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),

    /// The embedded engine reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A protocol value (action, timestamp) could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The table is not a synchronized table.
    #[error("unknown table: {table}")]
    InvalidTable {
        /// Name of the table.
        table: String,
    },

    /// The column does not exist on the table.
    #[error("unknown column {column} on table {table}")]
    InvalidColumn {
        /// Name of the table.
        table: String,
        /// Name of the column.
        column: String,
    },

    /// A change or write request is malformed.
    #[error("invalid change: {message}")]
    InvalidChange {
        /// Description of the problem.
        message: String,
    },

    /// The record does not exist or is already deleted.
    #[error("record not found: {table}/{id}")]
    RecordNotFound {
        /// Name of the table.
        table: String,
        /// Record id.
        id: String,
    },

    /// An image offered for import is not a usable store image.
    #[error("invalid image: {message}")]
    InvalidImage {
        /// Description of the problem.
        message: String,
    },

    /// The image was written by a newer schema.
    #[error("schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Version found in the image.
        found: i64,
        /// Highest version this build understands.
        supported: i64,
    },
}

impl CoreError {
    /// Creates a storage initialization error.
    pub fn storage_init(message: impl Into<String>) -> Self {
        Self::StorageInit {
            message: message.into(),
        }
    }

    /// Creates an invalid table error.
    pub fn invalid_table(table: impl Into<String>) -> Self {
        Self::InvalidTable {
            table: table.into(),
        }
    }

    /// Creates an invalid column error.
    pub fn invalid_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::InvalidColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an invalid change error.
    pub fn invalid_change(message: impl Into<String>) -> Self {
        Self::InvalidChange {
            message: message.into(),
        }
    }

    /// Creates a record not found error.
    pub fn record_not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Creates an invalid image error.
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::storage_init("bad header");
        assert_eq!(err.to_string(), "storage initialization failed: bad header");

        let err = CoreError::invalid_column("media", "nope");
        assert_eq!(err.to_string(), "unknown column nope on table media");

        let err = CoreError::record_not_found("users", "u1");
        assert_eq!(err.to_string(), "record not found: users/u1");
    }

    #[test]
    fn storage_error_converts_to_persistence() {
        let err: CoreError = StorageError::unavailable("disk full").into();
        assert!(matches!(err, CoreError::Persistence(_)));
    }
}
