//! # Fieldlog Core
//!
//! Local data layer for fieldlog.
//!
//! This crate provides:
//! - The embedded store: an in-memory SQLite database whose image is loaded
//!   from and saved to an [`ImageStore`](fieldlog_storage::ImageStore)
//! - Debounced persistence of the image ([`Persister`], [`Autosave`])
//! - The change queue of local mutations awaiting push ([`ChangeQueue`])
//! - Local writes that enqueue changes atomically ([`Records`])
//! - Applying pulled changes with conflict handling
//!   ([`Store::apply_remote`])
//! - Key/value settings and the sync cursor
//!
//! ## Example
//!
//! ```rust
//! use fieldlog_core::{Config, Store};
//! use fieldlog_storage::InMemoryImageStore;
//! use serde_json::json;
//!
//! let image_store = InMemoryImageStore::new();
//! let store = Store::open(&image_store, Config::default()).unwrap();
//!
//! let entry = store
//!     .records()
//!     .insert("log_entries", json!({"kind": "sighting", "species_name": "Roe deer"}))
//!     .unwrap();
//! assert_eq!(entry["version"], 1);
//! assert_eq!(store.queue().pending(5).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod config;
mod error;
mod persist;
mod queue;
mod records;
pub mod schema;
mod settings;
mod stats;
mod store;
mod value;

pub use apply::ApplyOutcome;
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use persist::{Autosave, AutosaveHandle, Persister};
pub use queue::{ChangeQueue, QueueCounts, QueueItem, QueueStatus};
pub use records::Records;
pub use settings::LAST_SYNC_TIMESTAMP_KEY;
pub use stats::{StoreStats, TableStats};
pub use store::{Store, Transaction};
pub use value::{from_sql, to_sql, Row};
