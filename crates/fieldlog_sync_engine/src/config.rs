//! Configuration for the sync engine.

use fieldlog_sync_protocol::ConflictPolicy;
use std::time::Duration;

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timeout for each push or pull request.
    pub request_timeout: Duration,
    /// Age after which `completed` queue items are purged.
    pub retention: Duration,
    /// `failed` items with this many attempts are no longer pushed
    /// automatically.
    pub max_item_attempts: u32,
    /// Maximum number of changes per push request.
    pub push_batch_size: usize,
    /// Default interval for automatic sync.
    pub auto_sync_interval: Duration,
    /// Policy for remote changes that collide with newer local rows.
    pub conflict_policy: ConflictPolicy,
}

impl SyncConfig {
    /// Creates a new sync configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retention window for completed items.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the attempt ceiling for failed items.
    pub fn with_max_item_attempts(mut self, attempts: u32) -> Self {
        self.max_item_attempts = attempts;
        self
    }

    /// Sets the push batch size.
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size.max(1);
        self
    }

    /// Sets the automatic sync interval.
    pub fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = interval;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            max_item_attempts: 5,
            push_batch_size: 100,
            auto_sync_interval: Duration::from_secs(5 * 60),
            conflict_policy: ConflictPolicy::LastWriteWins,
        }
    }
}
