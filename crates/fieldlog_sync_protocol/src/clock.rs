//! Time source and the canonical timestamp text format.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Duration, SecondsFormat, Timelike, Utc};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;

/// A source of wall-clock time.
///
/// Implementations must return millisecond-precision instants so that values
/// survive a round trip through [`format_timestamp`] unchanged.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// A clock shared between the store, the coordinator and the server.
pub type SharedClock = Arc<dyn Clock>;

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Returns the system clock as a [`SharedClock`].
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_millis(Utc::now())
    }
}

/// A manually driven clock for tests.
///
/// ```rust
/// use chrono::Duration;
/// use fieldlog_sync_protocol::{Clock, ManualClock};
///
/// let clock = ManualClock::at_rfc3339("2024-05-01T06:00:00.000Z").unwrap();
/// let start = clock.now();
/// clock.advance(Duration::days(8));
/// assert_eq!(clock.now() - start, Duration::days(8));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(truncate_millis(now)),
        }
    }

    /// Creates a clock frozen at the given RFC 3339 instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid timestamp.
    pub fn at_rfc3339(text: &str) -> ProtocolResult<Self> {
        parse_timestamp(text).map(Self::new)
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = truncate_millis(now);
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now = truncate_millis(*now + delta);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Formats a timestamp as RFC 3339 with millisecond precision and `Z` suffix.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 timestamp into UTC.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidTimestamp`] if the text does not parse.
pub fn parse_timestamp(text: &str) -> ProtocolResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ProtocolError::InvalidTimestamp(format!("{text}: {e}")))
}

fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = at.nanosecond();
    at.with_nanosecond(nanos - nanos % 1_000_000).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_has_millis_and_z() {
        let t = parse_timestamp("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(t), "2024-03-01T10:00:00.000Z");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(ProtocolError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn system_clock_is_millisecond_precise() {
        let now = SystemClock.now();
        assert_eq!(now.nanosecond() % 1_000_000, 0);
        assert_eq!(parse_timestamp(&format_timestamp(now)).unwrap(), now);
    }

    #[test]
    fn manual_clock_set_and_advance() {
        let clock = ManualClock::at_rfc3339("2024-01-01T00:00:00.000Z").unwrap();
        clock.advance(Duration::milliseconds(1500));
        assert_eq!(format_timestamp(clock.now()), "2024-01-01T00:00:01.500Z");

        clock.set(parse_timestamp("2023-06-01T00:00:00Z").unwrap());
        assert_eq!(format_timestamp(clock.now()), "2023-06-01T00:00:00.000Z");
    }

    #[test]
    fn text_order_matches_time_order() {
        let clock = ManualClock::at_rfc3339("2024-01-01T00:00:09.999Z").unwrap();
        let a = format_timestamp(clock.now());
        clock.advance(Duration::milliseconds(1));
        let b = format_timestamp(clock.now());
        assert!(a < b, "{a} should sort before {b}");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn at_millis(ms: i64) -> DateTime<Utc> {
            DateTime::from_timestamp_millis(ms).unwrap()
        }

        proptest! {
            #[test]
            fn text_order_is_time_order(a in 0i64..4_102_444_800_000, b in 0i64..4_102_444_800_000) {
                let (ta, tb) = (at_millis(a), at_millis(b));
                prop_assert_eq!(format_timestamp(ta).cmp(&format_timestamp(tb)), ta.cmp(&tb));
            }

            #[test]
            fn formatted_text_parses_back(ms in 0i64..4_102_444_800_000) {
                let t = at_millis(ms);
                prop_assert_eq!(parse_timestamp(&format_timestamp(t)).unwrap(), t);
            }
        }
    }
}
