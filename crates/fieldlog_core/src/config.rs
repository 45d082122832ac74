//! Store configuration.

use fieldlog_sync_protocol::{SharedClock, SystemClock};
use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Quiet period after the last mutation before the image is saved.
    pub autosave_debounce: Duration,

    /// Longest time a mutation may stay unsaved under a continuous burst.
    pub autosave_max_delay: Duration,

    /// Whether SQLite enforces declared foreign keys.
    ///
    /// Off by default: remote changes arrive in endpoint order, which need
    /// not respect parent-before-child.
    pub foreign_keys: bool,

    /// Time source for audit columns and queue timestamps.
    pub clock: SharedClock,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            autosave_debounce: Duration::from_secs(2),
            autosave_max_delay: Duration::from_secs(10),
            foreign_keys: false,
            clock: SystemClock::shared(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the autosave debounce window.
    #[must_use]
    pub fn autosave_debounce(mut self, value: Duration) -> Self {
        self.autosave_debounce = value;
        self
    }

    /// Sets the autosave upper bound.
    #[must_use]
    pub fn autosave_max_delay(mut self, value: Duration) -> Self {
        self.autosave_max_delay = value;
        self
    }

    /// Sets whether foreign keys are enforced.
    #[must_use]
    pub fn foreign_keys(mut self, value: bool) -> Self {
        self.foreign_keys = value;
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}
