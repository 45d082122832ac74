//! # fieldlog Sync Engine
//!
//! Replicates the local store with a remote sync endpoint.
//!
//! This crate provides:
//! - [`SyncCoordinator`], which runs push, pull and retention
//! - Automatic sync on an interval and on reconnect ([`NetworkStatus`])
//! - The [`SyncTransport`] abstraction with HTTP, loopback and mock
//!   implementations
//! - [`DataLayer`], a store with background saving and a coordinator
//!
//! ## Run model
//!
//! A run pushes first, then pulls, then purges old completed queue items.
//! Every phase runs even if an earlier one failed, and failures are reported
//! in [`SyncCycleResult::errors`] rather than returned. The remote endpoint is
//! authoritative: pulled changes are applied with upsert semantics and never
//! re-queued.
//!
//! ## Key Invariants
//!
//! - At most one run is in flight per coordinator
//! - A queued change is either `completed` (accepted), `failed` (attempt
//!   recorded) or `pending` after every run
//! - The sync cursor never moves backwards
//! - Re-applying the same pulled changes leaves the store unchanged

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod facade;
mod http;
mod scheduler;
mod state;
mod transport;

pub use config::SyncConfig;
pub use coordinator::SyncCoordinator;
pub use error::{SyncError, SyncResult};
pub use facade::DataLayer;
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use scheduler::{Connectivity, NetworkStatus};
pub use state::{SyncCycleResult, SyncState, SyncStats};
pub use transport::{MockTransport, SyncTransport};
