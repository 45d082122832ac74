//! # fieldlog Sync Protocol
//!
//! Wire types shared by the sync engine and the remote endpoint.
//!
//! This crate provides:
//! - [`ChangeItem`] and [`ChangeAction`], the unit of replication
//! - Push and pull messages with JSON encoding ([`WireMessage`])
//! - [`Conflict`] detection and [`ConflictPolicy`] resolution
//! - The [`Clock`] abstraction and the canonical timestamp format
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Timestamps
//!
//! Every timestamp crossing a crate boundary is a `DateTime<Utc>` truncated to
//! millisecond precision. Persisted and URL-encoded timestamps use RFC 3339
//! with a `Z` suffix and exactly three fractional digits, so lexical order of
//! the text equals chronological order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod clock;
mod conflict;
mod error;
mod messages;

pub use change::{ChangeAction, ChangeItem};
pub use clock::{format_timestamp, parse_timestamp, Clock, ManualClock, SharedClock, SystemClock};
pub use conflict::{Conflict, ConflictPolicy, ConflictResolution};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{PullRequest, PullResponse, PushRequest, PushResponse, WireMessage};
