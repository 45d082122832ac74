//! In-memory image store for testing.

use crate::backend::ImageStore;
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory image store.
///
/// Holds the last saved image in memory and counts how many saves happened.
/// Suitable for:
/// - Unit tests
/// - Debounce tests that assert on the number of writes
/// - Ephemeral stores that don't need persistence
///
/// # Example
///
/// ```rust
/// use fieldlog_storage::{ImageStore, InMemoryImageStore};
///
/// let store = InMemoryImageStore::new();
/// store.save(b"one").unwrap();
/// store.save(b"two").unwrap();
/// assert_eq!(store.save_count(), 2);
/// assert_eq!(store.image().as_deref(), Some(&b"two"[..]));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryImageStore {
    image: RwLock<Option<Vec<u8>>>,
    saves: AtomicU64,
}

impl InMemoryImageStore {
    /// Creates a new empty in-memory image store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory store that already holds an image.
    ///
    /// Useful for testing reopen and recovery scenarios.
    #[must_use]
    pub fn with_image(image: Vec<u8>) -> Self {
        Self {
            image: RwLock::new(Some(image)),
            saves: AtomicU64::new(0),
        }
    }

    /// Returns a copy of the current image.
    #[must_use]
    pub fn image(&self) -> Option<Vec<u8>> {
        self.image.read().clone()
    }

    /// Returns the number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Drops the stored image.
    pub fn clear(&self) {
        *self.image.write() = None;
    }
}

impl ImageStore for InMemoryImageStore {
    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.image.read().clone())
    }

    fn save(&self, image: &[u8]) -> StorageResult<()> {
        *self.image.write() = Some(image.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
