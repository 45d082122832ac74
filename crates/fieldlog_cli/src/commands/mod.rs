//! CLI command implementations.

pub mod backup;
pub mod inspect;
pub mod maintenance;
pub mod queue;
pub mod verify;

use fieldlog_core::{Config, Store};
use fieldlog_storage::{FileImageStore, ImageStore};
use std::path::Path;

/// A store opened from an image file.
pub struct OpenStore {
    /// The store.
    pub store: Store,
    /// The image file it was loaded from.
    pub image: FileImageStore,
}

impl OpenStore {
    /// Opens the image at `path`, which must already exist.
    pub fn existing(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let image = FileImageStore::open(path)?;
        if !image.exists() {
            return Err(format!("No store image found at {}", path.display()).into());
        }
        let store = Store::open(&image, Config::default())?;
        Ok(Self { store, image })
    }

    /// Opens the image at `path`, starting empty if it does not exist.
    pub fn create(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let image = FileImageStore::open(path)?;
        let store = Store::open(&image, Config::default())?;
        Ok(Self { store, image })
    }

    /// Writes the store back to its image file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let bytes = self.store.export()?;
        self.image.save(&bytes)?;
        tracing::debug!(path = %self.image.path().display(), bytes = bytes.len(), "saved image");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::OpenStore;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Creates an image with two users, one of them soft-deleted.
    pub fn sample_image() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fieldlog.img");
        let opened = OpenStore::create(&path).unwrap();
        let records = opened.store.records();
        records.insert("users", json!({"id": "u1", "name": "Ann"})).unwrap();
        records.insert("users", json!({"id": "u2", "name": "Bo"})).unwrap();
        records.soft_delete("users", "u2").unwrap();
        opened.save().unwrap();
        (dir, path)
    }
}
