//! Sync run state and results.

use chrono::{DateTime, Utc};
use fieldlog_sync_protocol::Conflict;
use std::fmt;
use std::time::Duration;

/// The current state of the sync coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No run has happened yet.
    Idle,
    /// Sending queued changes.
    Pushing,
    /// Fetching and applying remote changes.
    Pulling,
    /// Purging old completed queue items.
    Purging,
    /// The last run finished without errors.
    Synced,
    /// The last run finished with errors.
    Error,
}

impl SyncState {
    /// Returns true while a run is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Pushing | SyncState::Pulling | SyncState::Purging
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Pushing => "pushing",
            SyncState::Pulling => "pulling",
            SyncState::Purging => "purging",
            SyncState::Synced => "synced",
            SyncState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Cumulative statistics about sync runs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that finished without errors.
    pub cycles_completed: u64,
    /// Runs that finished with at least one error.
    pub cycles_failed: u64,
    /// Queue items accepted by the endpoint.
    pub changes_pushed: u64,
    /// Remote changes received.
    pub changes_pulled: u64,
    /// Conflicts detected while applying remote changes.
    pub conflicts_encountered: u64,
    /// End of the last run, by the store clock.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// First error of the last failed run.
    pub last_error: Option<String>,
}

/// Result of a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncCycleResult {
    /// True if `errors` is empty.
    pub success: bool,
    /// Queue items accepted by the endpoint.
    pub pushed: usize,
    /// Remote changes received.
    pub pulled: usize,
    /// Remote changes that changed the store.
    pub applied: usize,
    /// Completed queue items removed by retention.
    pub purged: usize,
    /// Conflicts detected while applying remote changes.
    pub conflicts: Vec<Conflict>,
    /// Human-readable errors, one per failed phase or skipped change.
    pub errors: Vec<String>,
    /// Duration of the run.
    pub duration: Duration,
}
