//! Conflict detection and resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// A remote change that collides with a newer local row.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// Table of the record.
    pub table_name: String,
    /// Record id.
    pub record_id: String,
    /// `updated_at` of the local row.
    pub local_updated_at: Option<DateTime<Utc>>,
    /// `updated_at` carried by the remote change.
    pub remote_updated_at: Option<DateTime<Utc>>,
    /// `version` of the local row.
    pub local_version: i64,
    /// `version` carried by the remote change.
    pub remote_version: i64,
    /// Remote payload that was not applied or was applied over local state.
    pub remote_payload: Value,
    /// Resolution (if any).
    pub resolution: Option<ConflictResolution>,
}

impl Conflict {
    /// Creates an unresolved conflict.
    pub fn new(
        table_name: impl Into<String>,
        record_id: impl Into<String>,
        local: (Option<DateTime<Utc>>, i64),
        remote: (Option<DateTime<Utc>>, i64),
        remote_payload: Value,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            record_id: record_id.into(),
            local_updated_at: local.0,
            remote_updated_at: remote.0,
            local_version: local.1,
            remote_version: remote.1,
            remote_payload,
            resolution: None,
        }
    }

    /// Returns true if the remote side is at least as new as the local side.
    ///
    /// Compares `updated_at` first and `version` second. If either side has no
    /// timestamp there is nothing to order by and the remote side is taken as
    /// newer.
    #[must_use]
    pub fn remote_is_newer_or_equal(&self) -> bool {
        match (self.remote_updated_at, self.local_updated_at) {
            (Some(remote), Some(local)) => {
                (remote, self.remote_version) >= (local, self.local_version)
            }
            _ => true,
        }
    }

    /// Resolves the conflict with the given resolution.
    pub fn resolve(&mut self, resolution: ConflictResolution) {
        self.resolution = Some(resolution);
    }

    /// Returns true if the conflict has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Returns true if the remote payload should be written.
    #[must_use]
    pub fn accepts_remote(&self) -> bool {
        self.resolution == Some(ConflictResolution::AcceptRemote)
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} local v{} remote v{}",
            self.table_name, self.record_id, self.local_version, self.remote_version
        )
    }
}

/// Resolution for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep the local row.
    KeepLocal,
    /// Overwrite with the remote row.
    AcceptRemote,
}

/// Policy for automatic conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Remote state always overwrites local state.
    ServerWins,
    /// The side with the later `updated_at` (then higher `version`) wins.
    #[default]
    LastWriteWins,
}

impl ConflictPolicy {
    /// Resolves a conflict according to this policy.
    pub fn resolve(&self, conflict: &mut Conflict) {
        let resolution = match self {
            Self::ServerWins => ConflictResolution::AcceptRemote,
            Self::LastWriteWins => {
                if conflict.remote_is_newer_or_equal() {
                    ConflictResolution::AcceptRemote
                } else {
                    ConflictResolution::KeepLocal
                }
            }
        };
        conflict.resolve(resolution);
    }

    /// Returns the configuration name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ServerWins => "server_wins",
            Self::LastWriteWins => "last_write_wins",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server_wins" => Ok(Self::ServerWins),
            "last_write_wins" => Ok(Self::LastWriteWins),
            other => Err(ProtocolError::invalid_message(format!(
                "unknown conflict policy: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_timestamp;
    use serde_json::json;

    fn at(text: &str) -> Option<DateTime<Utc>> {
        Some(parse_timestamp(text).unwrap())
    }

    fn conflict(local: (Option<DateTime<Utc>>, i64), remote: (Option<DateTime<Utc>>, i64)) -> Conflict {
        Conflict::new("log_entries", "e1", local, remote, json!({"id": "e1"}))
    }

    #[test]
    fn server_wins_always_accepts() {
        let mut c = conflict((at("2024-01-02T00:00:00Z"), 9), (at("2024-01-01T00:00:00Z"), 1));
        ConflictPolicy::ServerWins.resolve(&mut c);
        assert!(c.accepts_remote());
    }

    #[test]
    fn lww_keeps_newer_local() {
        let mut c = conflict((at("2024-01-02T00:00:00Z"), 1), (at("2024-01-01T00:00:00Z"), 5));
        ConflictPolicy::LastWriteWins.resolve(&mut c);
        assert_eq!(c.resolution, Some(ConflictResolution::KeepLocal));
    }

    #[test]
    fn lww_accepts_newer_remote() {
        let mut c = conflict((at("2024-01-01T00:00:00Z"), 5), (at("2024-01-02T00:00:00Z"), 1));
        ConflictPolicy::LastWriteWins.resolve(&mut c);
        assert!(c.accepts_remote());
    }

    #[test]
    fn lww_breaks_timestamp_tie_by_version() {
        let t = at("2024-01-01T00:00:00Z");
        let mut older = conflict((t, 3), (t, 2));
        ConflictPolicy::LastWriteWins.resolve(&mut older);
        assert!(!older.accepts_remote());

        let mut equal = conflict((t, 3), (t, 3));
        ConflictPolicy::LastWriteWins.resolve(&mut equal);
        assert!(equal.accepts_remote());
    }

    #[test]
    fn lww_without_timestamps_accepts_remote() {
        let mut c = conflict((at("2024-01-01T00:00:00Z"), 9), (None, 1));
        ConflictPolicy::LastWriteWins.resolve(&mut c);
        assert!(c.accepts_remote());

        let mut c = conflict((None, 9), (at("2024-01-01T00:00:00Z"), 1));
        ConflictPolicy::LastWriteWins.resolve(&mut c);
        assert!(c.accepts_remote());
    }

    #[test]
    fn policy_names() {
        for policy in [ConflictPolicy::ServerWins, ConflictPolicy::LastWriteWins] {
            assert_eq!(policy.as_str().parse::<ConflictPolicy>().unwrap(), policy);
        }
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::LastWriteWins);
    }
}
