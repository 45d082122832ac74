//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common test scenarios.

use fieldlog_core::{Config, Store};
use fieldlog_storage::{FileImageStore, ImageStore, InMemoryImageStore, StorageError, StorageResult};
use fieldlog_sync_protocol::ManualClock;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Start time of every fixture clock.
pub const FIXTURE_EPOCH: &str = "2024-05-01T06:00:00.000Z";

/// Creates a manual clock at [`FIXTURE_EPOCH`].
pub fn fixture_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at_rfc3339(FIXTURE_EPOCH).expect("fixture epoch is a valid timestamp"))
}

/// A test store with a manual clock and automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<Store>,
    /// The clock the store reads.
    pub clock: Arc<ManualClock>,
    /// Where the store's image is saved.
    pub image_store: Arc<dyn ImageStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a store whose image lives in memory.
    pub fn memory() -> Self {
        Self::with_image_store(Arc::new(InMemoryImageStore::new()), None)
    }

    /// Creates a store whose image is saved to a temporary file.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("fieldlog.img");
        let image_store = FileImageStore::open(&path).expect("Failed to open image file");
        Self::with_image_store(Arc::new(image_store), Some(temp_dir))
    }

    fn with_image_store(image_store: Arc<dyn ImageStore>, temp_dir: Option<TempDir>) -> Self {
        let clock = fixture_clock();
        let store = Store::open(image_store.as_ref(), Self::config(&clock))
            .expect("Failed to open store");
        Self {
            store: Arc::new(store),
            clock,
            image_store,
            _temp_dir: temp_dir,
        }
    }

    fn config(clock: &Arc<ManualClock>) -> Config {
        Config::new().clock(clock.clone())
    }

    /// Returns the image file path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("fieldlog.img"))
    }

    /// Saves the current image to the image store.
    pub fn save(&self) {
        let image = self.store.export().expect("Failed to export image");
        self.image_store.save(&image).expect("Failed to save image");
    }

    /// Saves the image and opens a second store from it, sharing the clock.
    pub fn reopen(&self) -> Store {
        self.save();
        Store::open(self.image_store.as_ref(), Self::config(&self.clock))
            .expect("Failed to reopen store")
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// An image store whose saves and loads can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyImageStore {
    inner: InMemoryImageStore,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    failed_saves: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl FlakyImageStore {
    /// Creates a store that works until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every save fail while `fail` is true.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Makes every load fail while `fail` is true.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of successful saves.
    pub fn save_count(&self) -> u64 {
        self.inner.save_count()
    }

    /// Returns the number of rejected saves.
    pub fn failed_save_count(&self) -> u64 {
        self.failed_saves.load(Ordering::SeqCst)
    }

    /// Returns the last saved image.
    pub fn image(&self) -> Option<Vec<u8>> {
        self.inner.image()
    }

    /// Returns the message of the last injected failure.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn fail(&self, message: &str) -> StorageError {
        *self.last_error.lock() = Some(message.to_string());
        StorageError::unavailable(message)
    }
}

impl ImageStore for FlakyImageStore {
    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(self.fail("injected load failure"));
        }
        self.inner.load()
    }

    fn save(&self, image: &[u8]) -> StorageResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            self.failed_saves.fetch_add(1, Ordering::SeqCst);
            return Err(self.fail("injected save failure"));
        }
        self.inner.save(image)
    }

    fn describe(&self) -> String {
        "flaky memory".to_string()
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use serde_json::json;

    /// Creates a store with one user and `entry_count` log entries, all
    /// queued and not yet pushed.
    pub fn populated_store(entry_count: usize) -> TestStore {
        let fixture = TestStore::memory();
        let records = fixture.store.records();
        records
            .insert("users", json!({"id": "user-1", "email": "ranger@example.com"}))
            .expect("Failed to insert user");
        records
            .insert("territories", json!({"id": "terr-1", "user_id": "user-1", "name": "North Ridge"}))
            .expect("Failed to insert territory");

        for i in 0..entry_count {
            records
                .insert(
                    "log_entries",
                    json!({
                        "id": format!("entry-{i}"),
                        "territory_id": "terr-1",
                        "user_id": "user-1",
                        "kind": "sighting",
                        "count": i as i64 + 1,
                    }),
                )
                .expect("Failed to insert log entry");
        }

        fixture
    }
}
