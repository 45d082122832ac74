//! Persisting store images.
//!
//! [`Persister`] saves the store's image through an [`ImageStore`] when the
//! store has changed since the last successful save. [`Autosave`] drives it
//! from a background task: every committed write starts (or extends) a
//! debounce window, and the image is saved once the window elapses or the
//! burst has run for `autosave_max_delay`, whichever comes first.
//!
//! ```text
//! write ─┐   write ─┐            write ─┐
//!        ▼          ▼                   ▼
//! ───────[debounce──[debounce────]save──[debounce────]save──►
//! ```

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use fieldlog_storage::ImageStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Saves store images when the store is dirty.
pub struct Persister {
    store: Arc<Store>,
    target: Arc<dyn ImageStore>,
    saved_generation: Mutex<u64>,
    flush_lock: Mutex<()>,
}

impl Persister {
    /// Creates a persister; the store counts as clean at its current
    /// generation.
    pub fn new(store: Arc<Store>, target: Arc<dyn ImageStore>) -> Self {
        let saved_generation = Mutex::new(store.generation());
        Self {
            store,
            target,
            saved_generation,
            flush_lock: Mutex::new(()),
        }
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Returns the image store images are saved to.
    #[must_use]
    pub fn target(&self) -> &dyn ImageStore {
        self.target.as_ref()
    }

    /// Returns true if the store changed since the last successful save.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.store.generation() != *self.saved_generation.lock()
    }

    /// Saves the image if the store is dirty.
    ///
    /// Returns `true` if an image was saved. A failed save leaves the store
    /// dirty.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Persistence`] if the image store rejects the save.
    pub fn flush(&self) -> CoreResult<bool> {
        let _guard = self.flush_lock.lock();
        if !self.is_dirty() {
            return Ok(false);
        }

        let (generation, image) = self.store.export_with_generation()?;
        self.target.save(&image).map_err(|e| {
            tracing::warn!(adapter = %self.target.describe(), error = %e, "failed to save store image");
            CoreError::from(e)
        })?;

        *self.saved_generation.lock() = generation;
        tracing::debug!(
            adapter = %self.target.describe(),
            generation,
            bytes = image.len(),
            "store image saved"
        );
        Ok(true)
    }
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("target", &self.target.describe())
            .field("saved_generation", &*self.saved_generation.lock())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Background debounced saving.
#[derive(Debug)]
pub struct Autosave;

impl Autosave {
    /// Spawns the autosave task on the current tokio runtime.
    ///
    /// Timing comes from the store's [`Config`](crate::Config).
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(persister: Arc<Persister>) -> AutosaveHandle {
        let config = persister.store().config();
        let debounce = config.autosave_debounce;
        let max_delay = config.autosave_max_delay.max(debounce);
        let changes = persister.store().subscribe_changes();
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(run(
            Arc::clone(&persister),
            changes,
            stop_rx,
            debounce,
            max_delay,
        ));

        AutosaveHandle {
            persister,
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Handle to a running autosave task.
///
/// Dropping the handle stops the task without a final save; use
/// [`shutdown`](Self::shutdown) to save pending changes.
#[derive(Debug)]
pub struct AutosaveHandle {
    persister: Arc<Persister>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Returns the persister driven by this task.
    #[must_use]
    pub fn persister(&self) -> &Arc<Persister> {
        &self.persister
    }

    /// Stops the task and saves any pending changes.
    ///
    /// Returns `true` if a final image was saved.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Persistence`] if the final save fails.
    pub async fn shutdown(mut self) -> CoreResult<bool> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "autosave task ended abnormally");
        }
        self.persister.flush()
    }
}

async fn run(
    persister: Arc<Persister>,
    mut changes: watch::Receiver<u64>,
    mut stop: oneshot::Receiver<()>,
    debounce: Duration,
    max_delay: Duration,
) {
    tracing::debug!(?debounce, ?max_delay, "autosave started");
    loop {
        tokio::select! {
            _ = &mut stop => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let hard_deadline = Instant::now() + max_delay;
        let mut deadline = (Instant::now() + debounce).min(hard_deadline);
        loop {
            tokio::select! {
                _ = &mut stop => {
                    tracing::debug!("autosave stopped");
                    return;
                }
                () = tokio::time::sleep_until(deadline) => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    deadline = (Instant::now() + debounce).min(hard_deadline);
                }
            }
        }

        // A failed save leaves the store dirty; the next write retries.
        let _ = persister.flush();
    }
    tracing::debug!("autosave stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use fieldlog_storage::{FileImageStore, InMemoryImageStore, StorageError, StorageResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Flaky {
        fail: AtomicBool,
        inner: InMemoryImageStore,
    }

    impl ImageStore for Flaky {
        fn load(&self) -> StorageResult<Option<Vec<u8>>> {
            self.inner.load()
        }

        fn save(&self, image: &[u8]) -> StorageResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::unavailable("disk full"));
            }
            self.inner.save(image)
        }
    }

    fn setup(config: Config) -> (Arc<Store>, Arc<InMemoryImageStore>, Arc<Persister>) {
        let store = Arc::new(Store::new(config).unwrap());
        let target = Arc::new(InMemoryImageStore::new());
        let persister = Arc::new(Persister::new(Arc::clone(&store), target.clone()));
        (store, target, persister)
    }

    fn write(store: &Store, id: &str) {
        store.records().insert("users", json!({"id": id})).unwrap();
    }

    #[test]
    fn flush_saves_only_when_dirty() {
        let (store, target, persister) = setup(Config::default());
        assert!(!persister.is_dirty());
        assert!(!persister.flush().unwrap());

        write(&store, "u1");
        assert!(persister.is_dirty());
        assert!(persister.flush().unwrap());
        assert!(!persister.is_dirty());
        assert_eq!(target.save_count(), 1);

        let reopened = Store::open(target.as_ref(), Config::default()).unwrap();
        assert!(reopened.records().get("users", "u1").unwrap().is_some());
    }

    #[test]
    fn file_image_survives_restart() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.img");
        {
            let target = Arc::new(FileImageStore::open(&path).unwrap());
            let store = Arc::new(Store::open(target.as_ref(), Config::default()).unwrap());
            let persister = Persister::new(Arc::clone(&store), target);
            write(&store, "u1");
            assert!(persister.flush().unwrap());
        }

        let target = FileImageStore::open(&path).unwrap();
        let reopened = Store::open(&target, Config::default()).unwrap();
        assert!(reopened.records().get("users", "u1").unwrap().is_some());
        assert_eq!(reopened.queue().len().unwrap(), 1);
    }

    #[test]
    fn failed_save_keeps_store_dirty() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let target = Arc::new(Flaky::default());
        let persister = Persister::new(Arc::clone(&store), target.clone());

        write(&store, "u1");
        target.fail.store(true, Ordering::SeqCst);
        let err = persister.flush().unwrap_err();
        assert!(matches!(err, CoreError::Persistence(_)));
        assert!(persister.is_dirty());

        target.fail.store(false, Ordering::SeqCst);
        assert!(persister.flush().unwrap());
        assert_eq!(target.inner.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_writes_saves_once() {
        let config = Config::new()
            .autosave_debounce(Duration::from_secs(2))
            .autosave_max_delay(Duration::from_secs(10));
        let (store, target, persister) = setup(config);
        let handle = Autosave::spawn(persister);

        for i in 0..3 {
            write(&store, &format!("u{i}"));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(target.save_count(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(target.save_count(), 1);

        assert!(!handle.shutdown().await.unwrap());
        assert_eq!(target.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_writes_are_saved_within_max_delay() {
        let config = Config::new()
            .autosave_debounce(Duration::from_secs(2))
            .autosave_max_delay(Duration::from_secs(10));
        let (store, target, persister) = setup(config);
        let handle = Autosave::spawn(persister);

        for i in 0..12 {
            write(&store, &format!("u{i}"));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert!(target.save_count() >= 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_changes() {
        let (store, target, persister) = setup(Config::default());
        let handle = Autosave::spawn(Arc::clone(&persister));

        write(&store, "u1");
        assert!(handle.shutdown().await.unwrap());
        assert_eq!(target.save_count(), 1);
        assert!(!persister.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_store_is_never_saved() {
        let (_store, target, persister) = setup(Config::default());
        let handle = Autosave::spawn(persister);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!handle.shutdown().await.unwrap());
        assert_eq!(target.save_count(), 0);
    }
}
