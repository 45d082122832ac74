//! Error types for persistence operations.

use std::io;
use thiserror::Error;

/// Result type for persistence operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while saving or loading a store image.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stored image failed an integrity check.
    #[error("image corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the image file.
    #[error("image locked: another process has exclusive access to {0}")]
    Locked(String),

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The adapter refused the operation.
    #[error("adapter unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::corrupted("checksum mismatch");
        assert_eq!(err.to_string(), "image corrupted: checksum mismatch");

        let err = StorageError::Locked("/tmp/store.img".into());
        assert!(err.to_string().contains("/tmp/store.img"));
    }

    #[test]
    fn io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
