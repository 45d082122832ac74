//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The endpoint answered but refused the request.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local store error during sync.
    #[error("store error: {0}")]
    Store(#[from] fieldlog_core::CoreError),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Another sync run is in flight.
    #[error("a sync run is already in progress")]
    AlreadyRunning,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::NotConnected | SyncError::Rejected(_) => true,
            _ => false,
        }
    }
}

impl From<fieldlog_sync_protocol::ProtocolError> for SyncError {
    fn from(e: fieldlog_sync_protocol::ProtocolError) -> Self {
        Self::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Rejected("busy".into()).is_retryable());
        assert!(!SyncError::Protocol("bad json".into()).is_retryable());
        assert!(!SyncError::AlreadyRunning.is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(SyncError::NotConnected.to_string(), "not connected to server");
        assert_eq!(SyncError::Timeout.to_string(), "operation timed out");
        assert!(SyncError::transport_retryable("connection reset")
            .to_string()
            .contains("connection reset"));
    }
}
