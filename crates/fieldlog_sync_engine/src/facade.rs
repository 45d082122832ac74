//! Consumer-facing entry point.

use crate::config::SyncConfig;
use crate::coordinator::SyncCoordinator;
use crate::error::SyncResult;
use crate::scheduler::NetworkStatus;
use crate::state::SyncCycleResult;
use crate::transport::SyncTransport;
use fieldlog_core::{Autosave, AutosaveHandle, Config, Persister, QueueItem, Store};
use fieldlog_storage::ImageStore;
use fieldlog_sync_protocol::ChangeAction;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// The local data layer: a store saved in the background and a sync
/// coordinator sharing it.
///
/// # Example
///
/// ```rust,no_run
/// use fieldlog_core::Config;
/// use fieldlog_storage::InMemoryImageStore;
/// use fieldlog_sync_engine::{DataLayer, MockTransport, SyncConfig};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn demo() -> fieldlog_sync_engine::SyncResult<()> {
/// let layer = DataLayer::open(
///     Arc::new(InMemoryImageStore::new()),
///     MockTransport::new(),
///     Config::default(),
///     SyncConfig::default(),
/// )?;
/// layer.store().records().insert("users", json!({"email": "a@example.com"}))?;
/// let result = layer.run_sync().await?;
/// assert!(result.success);
/// layer.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct DataLayer<T: SyncTransport + 'static> {
    sync: Arc<SyncCoordinator<T>>,
    autosave: AutosaveHandle,
}

impl<T: SyncTransport + 'static> DataLayer<T> {
    /// Opens the store from `image_store`, starts autosave and builds the
    /// coordinator. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`](crate::SyncError::Store) wrapping
    /// `CoreError::StorageInit` if the store cannot be opened.
    pub fn open(
        image_store: Arc<dyn ImageStore>,
        transport: T,
        config: Config,
        sync_config: SyncConfig,
    ) -> SyncResult<Self> {
        let store = Arc::new(Store::open(image_store.as_ref(), config)?);
        let persister = Arc::new(Persister::new(Arc::clone(&store), image_store));
        let autosave = Autosave::spawn(Arc::clone(&persister));
        let sync = SyncCoordinator::new(store, transport, sync_config).with_persister(persister);
        tracing::info!("data layer opened");

        Ok(Self {
            sync: Arc::new(sync),
            autosave,
        })
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<Store> {
        self.sync.store()
    }

    /// Returns the sync coordinator.
    pub fn coordinator(&self) -> &Arc<SyncCoordinator<T>> {
        &self.sync
    }

    /// Returns the network status that gates automatic sync.
    pub fn network(&self) -> &NetworkStatus {
        self.sync.network()
    }

    /// Appends a change to the queue without touching the record tables.
    ///
    /// Use [`Store::records`] to write a record and queue it together.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not synchronized or the id is empty.
    pub fn enqueue_change(
        &self,
        action: ChangeAction,
        table_name: &str,
        record_id: &str,
        payload: Value,
    ) -> SyncResult<QueueItem> {
        Ok(self
            .store()
            .queue()
            .enqueue(action, table_name, record_id, payload)?)
    }

    /// Runs one sync run now.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyRunning`](crate::SyncError::AlreadyRunning)
    /// if a run is in flight.
    pub async fn run_sync(&self) -> SyncResult<SyncCycleResult> {
        self.sync.run_sync().await
    }

    /// Starts automatic sync every `interval`.
    ///
    /// Returns false if it is already running or `interval` is zero.
    pub fn start_auto_sync(&self, interval: Duration) -> bool {
        self.sync.start_auto_sync(interval)
    }

    /// Starts automatic sync at the configured
    /// [`auto_sync_interval`](SyncConfig::auto_sync_interval).
    pub fn start_default_auto_sync(&self) -> bool {
        self.start_auto_sync(self.sync.config().auto_sync_interval)
    }

    /// Stops automatic sync.
    pub fn stop_auto_sync(&self) -> bool {
        self.sync.stop_auto_sync()
    }

    /// Saves the store image now if it has unsaved changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be saved.
    pub fn flush(&self) -> SyncResult<bool> {
        Ok(self.autosave.persister().flush()?)
    }

    /// Stops automatic sync, waits for an in-flight run and saves pending
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the final save fails.
    pub async fn shutdown(self) -> SyncResult<bool> {
        self.sync.stop_auto_sync();
        self.sync.wait_idle().await;
        let saved = self.autosave.shutdown().await?;
        tracing::info!(saved, "data layer shut down");
        Ok(saved)
    }
}

impl<T: SyncTransport + 'static> std::fmt::Debug for DataLayer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayer")
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use fieldlog_core::QueueStatus;
    use fieldlog_storage::InMemoryImageStore;
    use serde_json::json;

    fn open(image: &Arc<InMemoryImageStore>) -> DataLayer<MockTransport> {
        DataLayer::open(
            image.clone(),
            MockTransport::new(),
            Config::default(),
            SyncConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let image = Arc::new(InMemoryImageStore::new());
        let layer = open(&image);
        layer.store().records().insert("users", json!({"id": "u1"})).unwrap();
        let result = layer.run_sync().await.unwrap();
        assert_eq!(result.pushed, 1);
        layer.shutdown().await.unwrap();

        let layer = open(&image);
        let items = layer.store().queue().list(None, None).unwrap();
        assert_eq!(items[0].status, QueueStatus::Completed);
        assert!(layer.store().sync_cursor().unwrap().is_some());
        assert!(layer.store().records().get("users", "u1").unwrap().is_some());
    }

    #[tokio::test]
    async fn unsynced_changes_survive_restart() {
        let image = Arc::new(InMemoryImageStore::new());
        let layer = open(&image);
        layer
            .enqueue_change(ChangeAction::Delete, "media", "m1", json!({"id": "m1"}))
            .unwrap();
        assert!(layer.shutdown().await.unwrap());

        let layer = open(&image);
        let pending = layer.store().queue().pending(5).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record_id, "m1");
    }

    #[tokio::test]
    async fn flush_is_noop_when_clean() {
        let image = Arc::new(InMemoryImageStore::new());
        let layer = open(&image);
        assert!(!layer.flush().unwrap());

        layer.store().records().insert("users", json!({})).unwrap();
        assert!(layer.flush().unwrap());
        assert!(!layer.flush().unwrap());
        assert_eq!(image.save_count(), 1);
    }

    #[tokio::test]
    async fn corrupt_image_fails_to_open() {
        let image = Arc::new(InMemoryImageStore::with_image(b"not a database".to_vec()));
        let err = DataLayer::open(
            image,
            MockTransport::new(),
            Config::default(),
            SyncConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, crate::SyncError::Store(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_sync_follows_session() {
        let image = Arc::new(InMemoryImageStore::new());
        let layer = open(&image);
        layer.network().set_session_active(true);
        assert!(layer.start_default_auto_sync());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(layer.coordinator().transport().pull_requests().len(), 1);
        assert!(layer.stop_auto_sync());
        layer.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn auto_sync_uses_given_interval() {
        let image = Arc::new(InMemoryImageStore::new());
        let layer = open(&image);
        layer.network().set_session_active(true);
        assert!(!layer.start_auto_sync(Duration::ZERO));
        assert!(layer.start_auto_sync(Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_secs(125)).await;

        assert_eq!(layer.coordinator().transport().pull_requests().len(), 3);
        layer.shutdown().await.unwrap();
    }
}
