//! # fieldlog Sync Server
//!
//! Reference remote sync endpoint for fieldlog.
//!
//! This crate provides:
//! - An in-memory change log with strictly increasing server time
//! - Push and pull handlers speaking the JSON wire format
//! - HTTP-style routing (`POST /sync/push`, `GET /sync/pull?since=`) for
//!   in-process loopback transports
//!
//! # Protocol
//!
//! Clients push batches of changes and pull everything stamped after their
//! cursor. Pushing the same change id twice stores it once. Every pull
//! answers with a `server_time` that clients store as their next cursor;
//! changes accepted later are always stamped after it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod log;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use log::{ServerChangeLog, StampedChange};
pub use server::SyncServer;
