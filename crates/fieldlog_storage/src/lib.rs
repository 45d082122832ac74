//! # fieldlog storage
//!
//! Persistence adapters for the fieldlog store image.
//!
//! The embedded store keeps its whole dataset in memory and hands a serialized
//! snapshot (the *image*) to an adapter whenever it wants the data to become
//! durable. Adapters are **opaque byte stores**: they never interpret the image.
//!
//! ## Design Principles
//!
//! - Two operations only: [`ImageStore::save`] and [`ImageStore::load`]
//! - `load` returning `None` means "no image yet", never an error
//! - Adapters must be `Send + Sync`; the autosave task and the caller share them
//! - The store owns the image format
//!
//! ## Available Adapters
//!
//! - [`InMemoryImageStore`] - For testing and ephemeral data
//! - [`FileImageStore`] - Atomic, checksummed, single-writer file storage
//! - [`EncryptedImageStore`] - Wrapper that adds AES-256-GCM encryption at rest
//!
//! ## Example
//!
//! ```rust
//! use fieldlog_storage::{ImageStore, InMemoryImageStore};
//!
//! let store = InMemoryImageStore::new();
//! assert!(store.load().unwrap().is_none());
//!
//! store.save(b"image bytes").unwrap();
//! assert_eq!(store.load().unwrap().as_deref(), Some(&b"image bytes"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
#[cfg(feature = "encryption")]
mod encrypted;
mod error;
mod file;
mod memory;

pub use backend::ImageStore;
#[cfg(feature = "encryption")]
pub use encrypted::{EncryptedImageStore, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{StorageError, StorageResult};
pub use file::FileImageStore;
pub use memory::InMemoryImageStore;
