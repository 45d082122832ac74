//! Server-side change log.

use chrono::{DateTime, Duration, Utc};
use fieldlog_sync_protocol::{ChangeItem, SharedClock};
use parking_lot::RwLock;
use std::collections::HashSet;

/// A change with the server time it was accepted at.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedChange {
    /// Acceptance time. Unique within a log.
    pub stamp: DateTime<Utc>,
    /// The change as pushed.
    pub change: ChangeItem,
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<StampedChange>,
    seen: HashSet<String>,
    last_stamp: Option<DateTime<Utc>>,
}

/// Server-side change log.
///
/// Every accepted change gets a stamp strictly greater than every stamp and
/// every `server_time` handed out before, so a client whose cursor is a
/// `server_time` from this log never misses a later change.
#[derive(Debug)]
pub struct ServerChangeLog {
    state: RwLock<LogState>,
    clock: SharedClock,
}

impl ServerChangeLog {
    /// Creates an empty log.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            clock,
        }
    }

    /// Appends changes in order, skipping change ids already in the log.
    ///
    /// Returns the number of changes newly stored.
    pub fn append(&self, changes: Vec<ChangeItem>) -> usize {
        let mut state = self.state.write();
        let mut stored = 0;

        for change in changes {
            if !state.seen.insert(change.id.clone()) {
                tracing::debug!(change_id = %change.id, "duplicate change ignored");
                continue;
            }
            let now = self.clock.now();
            let stamp = match state.last_stamp {
                Some(last) if last >= now => last + Duration::milliseconds(1),
                _ => now,
            };
            state.last_stamp = Some(stamp);
            state.entries.push(StampedChange { stamp, change });
            stored += 1;
        }
        stored
    }

    /// Returns the current server time and reserves it, so later stamps are
    /// strictly greater.
    pub fn observe(&self) -> DateTime<Utc> {
        let mut state = self.state.write();
        let now = self.clock.now();
        let time = state.last_stamp.map_or(now, |last| last.max(now));
        state.last_stamp = Some(time);
        time
    }

    /// Returns changes stamped after `since`, oldest first.
    pub fn changes_since(&self, since: Option<DateTime<Utc>>) -> Vec<ChangeItem> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|entry| since.map_or(true, |since| entry.stamp > since))
            .map(|entry| entry.change.clone())
            .collect()
    }

    /// Returns every entry, oldest first.
    pub fn entries(&self) -> Vec<StampedChange> {
        self.state.read().entries.clone()
    }

    /// Returns the number of stored changes.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}
