//! # fieldlog Testkit
//!
//! Test utilities for fieldlog.
//!
//! This crate provides:
//! - Store fixtures backed by memory or a temporary file, with a manual clock
//! - Failure-injecting image stores and call-counting transports
//! - In-process transports wired to the reference sync server
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use fieldlog_testkit::prelude::*;
//! use serde_json::json;
//!
//! let fixture = TestStore::memory();
//! fixture.store.records().insert("users", json!({"id": "u1"})).unwrap();
//! assert_eq!(fixture.store.queue().len().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod transports;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::transports::*;
}

pub use fixtures::*;
pub use generators::*;
pub use transports::*;
