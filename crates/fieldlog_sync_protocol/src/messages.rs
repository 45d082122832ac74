//! Protocol messages for sync.
//!
//! The endpoint speaks JSON over two routes:
//!
//! | Route | Request | Response |
//! |---|---|---|
//! | `POST /sync/push` | [`PushRequest`] | [`PushResponse`] |
//! | `GET /sync/pull?since=<ts>` | [`PullRequest`] (query string) | [`PullResponse`] |

use crate::change::ChangeItem;
use crate::clock::{format_timestamp, parse_timestamp};
use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JSON encoding shared by all protocol messages.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes to JSON bytes.
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Batch of local changes sent to the endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PushRequest {
    /// Changes in creation order.
    pub changes: Vec<ChangeItem>,
}

impl PushRequest {
    /// Creates a push request.
    #[must_use]
    pub fn new(changes: Vec<ChangeItem>) -> Self {
        Self { changes }
    }
}

impl WireMessage for PushRequest {}

/// Endpoint acknowledgement of a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Whether the batch was accepted.
    pub success: bool,
    /// Number of changes newly recorded (re-pushed changes are not counted).
    #[serde(default)]
    pub accepted: usize,
    /// Error message if rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Endpoint time at which the batch was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<DateTime<Utc>>,
}

impl PushResponse {
    /// Creates a successful push response.
    #[must_use]
    pub fn success(accepted: usize, server_time: DateTime<Utc>) -> Self {
        Self {
            success: true,
            accepted,
            error: None,
            server_time: Some(server_time),
        }
    }

    /// Creates a rejected push response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            accepted: 0,
            error: Some(message.into()),
            server_time: None,
        }
    }
}

impl WireMessage for PushResponse {}

/// Request for changes recorded after `since`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PullRequest {
    /// Exclusive lower bound; `None` pulls everything.
    pub since: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Creates a pull request.
    #[must_use]
    pub fn new(since: Option<DateTime<Utc>>) -> Self {
        Self { since }
    }

    /// Renders the URL query string, without the leading `?`.
    ///
    /// Empty when `since` is `None`.
    #[must_use]
    pub fn to_query(&self) -> String {
        match self.since {
            Some(since) => format!("since={}", urlencoding::encode(&format_timestamp(since))),
            None => String::new(),
        }
    }

    /// Parses a URL query string (without the leading `?`).
    ///
    /// Unknown parameters are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if `since` is present but not a timestamp.
    pub fn from_query(query: &str) -> ProtocolResult<Self> {
        let mut since = None;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == "since" && !value.is_empty() {
                let value = urlencoding::decode(value)
                    .map_err(|e| ProtocolError::invalid_message(format!("bad escape in {value}: {e}")))?;
                since = Some(parse_timestamp(&value)?);
            }
        }
        Ok(Self { since })
    }
}

impl WireMessage for PullRequest {}

/// Changes returned by the endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PullResponse {
    /// Changes in the endpoint's chronological order.
    #[serde(default)]
    pub changes: Vec<ChangeItem>,
    /// Endpoint time the response is consistent with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<DateTime<Utc>>,
}

impl PullResponse {
    /// Creates a pull response.
    #[must_use]
    pub fn new(changes: Vec<ChangeItem>, server_time: Option<DateTime<Utc>>) -> Self {
        Self {
            changes,
            server_time,
        }
    }

    /// Creates an empty pull response.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl WireMessage for PullResponse {}
