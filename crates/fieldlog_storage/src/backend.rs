//! Persistence adapter trait definition.

use crate::error::StorageResult;

/// Durable storage for the store image.
///
/// An `ImageStore` keeps exactly one image: the most recent one passed to
/// [`save`](Self::save). Adapters never look inside the bytes.
///
/// # Invariants
///
/// - `load` after a successful `save` returns exactly the saved bytes
/// - `load` on an adapter that was never saved to returns `Ok(None)`
/// - A failed `save` leaves the previously saved image intact
/// - Adapters must be `Send + Sync` for use from the autosave task
///
/// # Implementors
///
/// - [`super::InMemoryImageStore`] - For testing
/// - [`super::FileImageStore`] - For persistent storage
pub trait ImageStore: Send + Sync {
    /// Loads the last saved image.
    ///
    /// Returns `Ok(None)` if no image has been saved yet; callers treat this
    /// as "create a fresh store".
    ///
    /// # Errors
    ///
    /// Returns an error if the image exists but cannot be read or fails an
    /// integrity check.
    fn load(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the stored image with `image`.
    ///
    /// After this returns successfully the image survives process termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the image could not be written durably.
    fn save(&self, image: &[u8]) -> StorageResult<()>;

    /// Short human-readable description used in log lines.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<S: ImageStore + ?Sized> ImageStore for std::sync::Arc<S> {
    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        (**self).load()
    }

    fn save(&self, image: &[u8]) -> StorageResult<()> {
        (**self).save(image)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<S: ImageStore + ?Sized> ImageStore for Box<S> {
    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        (**self).load()
    }

    fn save(&self, image: &[u8]) -> StorageResult<()> {
        (**self).save(image)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<S: ImageStore + ?Sized> ImageStore for &S {
    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        (**self).load()
    }

    fn save(&self, image: &[u8]) -> StorageResult<()> {
        (**self).save(image)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
