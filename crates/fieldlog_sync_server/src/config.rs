//! Server configuration.

use fieldlog_sync_protocol::{SharedClock, SystemClock};

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of changes per push request.
    pub max_push_batch: usize,
    /// Clock used to stamp accepted changes.
    pub clock: SharedClock,
}

impl ServerConfig {
    /// Creates a new server configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_push_batch: 1000,
            clock: SystemClock::shared(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlog_sync_protocol::{Clock, ManualClock};
    use std::sync::Arc;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_push_batch, 1000);
    }

    #[test]
    fn config_builder() {
        let clock = Arc::new(ManualClock::at_rfc3339("2024-05-01T06:00:00Z").unwrap());
        let config = ServerConfig::new()
            .with_max_push_batch(50)
            .with_clock(clock.clone());

        assert_eq!(config.max_push_batch, 50);
        assert_eq!(config.clock.now(), clock.now());
    }
}
