//! The sync coordinator.
//!
//! A run has three phases that always execute in order, each one even if an
//! earlier phase failed:
//!
//! 1. **Push**: queued changes are marked `syncing` and sent oldest first in
//!    batches. An accepted batch becomes `completed`; a failed batch becomes
//!    `failed` with its attempt counter incremented, the batches not yet sent
//!    go back to `pending`, and the phase stops.
//! 2. **Pull**: changes since the sync cursor are fetched and applied one by
//!    one. A change that fails to apply is skipped and reported. The cursor
//!    then advances to the endpoint's `server_time` (or the time the request
//!    was sent) and never moves backwards.
//! 3. **Retention**: `completed` items older than the retention window are
//!    purged.
//!
//! Failures are collected into [`SyncCycleResult::errors`] instead of being
//! returned. At most one run is in flight per coordinator.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::scheduler::{AutoSyncTask, NetworkStatus};
use crate::state::{SyncCycleResult, SyncState, SyncStats};
use crate::transport::SyncTransport;
use fieldlog_core::{Persister, QueueItem, QueueStatus, Store};
use fieldlog_sync_protocol::{PullRequest, PushRequest};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs push, pull and retention against a [`Store`].
pub struct SyncCoordinator<T: SyncTransport> {
    store: Arc<Store>,
    transport: T,
    config: SyncConfig,
    persister: Option<Arc<Persister>>,
    network: NetworkStatus,
    run_lock: tokio::sync::Mutex<()>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    pub(crate) auto_sync: Mutex<Option<AutoSyncTask>>,
}

impl<T: SyncTransport> SyncCoordinator<T> {
    /// Creates a coordinator.
    pub fn new(store: Arc<Store>, transport: T, config: SyncConfig) -> Self {
        Self {
            store,
            transport,
            config,
            persister: None,
            network: NetworkStatus::default(),
            run_lock: tokio::sync::Mutex::new(()),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            auto_sync: Mutex::new(None),
        }
    }

    /// Flushes `persister` at the end of every run.
    pub fn with_persister(mut self, persister: Arc<Persister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Uses a shared network status for automatic sync.
    pub fn with_network(mut self, network: NetworkStatus) -> Self {
        self.network = network;
        self
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the network status that gates automatic sync.
    pub fn network(&self) -> &NetworkStatus {
        &self.network
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a run is in flight.
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Waits until no run is in flight.
    pub async fn wait_idle(&self) {
        drop(self.run_lock.lock().await);
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Performs a full sync run: push, pull, retention.
    ///
    /// Expected failures (network, rejection, bad remote changes) are
    /// reported in the result, never as `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyRunning`] if another run is in flight.
    pub async fn run_sync(&self) -> SyncResult<SyncCycleResult> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::debug!("sync run skipped, another run is in flight");
            return Err(SyncError::AlreadyRunning);
        };

        let start = Instant::now();
        let mut result = SyncCycleResult::default();
        tracing::info!("sync run started");

        self.set_state(SyncState::Pushing);
        self.push_phase(&mut result).await;

        self.set_state(SyncState::Pulling);
        self.pull_phase(&mut result).await;

        self.set_state(SyncState::Purging);
        self.retention_phase(&mut result);

        if let Some(persister) = &self.persister {
            if let Err(e) = persister.flush() {
                tracing::warn!(error = %e, "failed to save store after sync run");
            }
        }

        result.success = result.errors.is_empty();
        result.duration = start.elapsed();
        self.finish(&result);
        Ok(result)
    }

    async fn push_phase(&self, result: &mut SyncCycleResult) {
        if let Err(e) = self.push_all(result).await {
            tracing::warn!(error = %e, "push failed");
            result.errors.push(format!("Push failed: {e}"));
        }
    }

    async fn push_all(&self, result: &mut SyncCycleResult) -> SyncResult<()> {
        let queue = self.store.queue();
        queue.requeue_interrupted()?;

        let items = queue.pending(self.config.max_item_attempts)?;
        if items.is_empty() {
            tracing::debug!("nothing to push");
            return Ok(());
        }
        queue.mark(&ids(&items), QueueStatus::Syncing, None)?;

        let batches: Vec<&[QueueItem]> = items.chunks(self.config.push_batch_size.max(1)).collect();
        for (index, batch) in batches.iter().enumerate() {
            let batch_ids = ids(batch);
            let request = PushRequest::new(batch.iter().map(QueueItem::to_change).collect());

            match self.send_push(&request).await {
                Ok(()) => {
                    queue.mark(&batch_ids, QueueStatus::Completed, None)?;
                    result.pushed += batch.len();
                    tracing::debug!(batch = index, items = batch.len(), "batch pushed");
                }
                Err(e) => {
                    queue.mark_failed(&batch_ids, &e.to_string())?;
                    let unsent: Vec<String> = batches[index + 1..].iter().flat_map(|b| ids(b)).collect();
                    if !unsent.is_empty() {
                        queue.mark(&unsent, QueueStatus::Pending, None)?;
                    }
                    return Err(e);
                }
            }
        }

        tracing::info!(pushed = result.pushed, "push complete");
        Ok(())
    }

    async fn send_push(&self, request: &PushRequest) -> SyncResult<()> {
        let response = self.with_timeout(self.transport.push(request)).await?;
        if response.success {
            Ok(())
        } else {
            Err(SyncError::Rejected(
                response.error.unwrap_or_else(|| "push rejected".into()),
            ))
        }
    }

    async fn pull_phase(&self, result: &mut SyncCycleResult) {
        if let Err(e) = self.pull_all(result).await {
            tracing::warn!(error = %e, "pull failed");
            result.errors.push(format!("Pull failed: {e}"));
        }
    }

    async fn pull_all(&self, result: &mut SyncCycleResult) -> SyncResult<()> {
        let since = self.store.sync_cursor()?;
        let requested_at = self.store.now();
        let response = self
            .with_timeout(self.transport.pull(&PullRequest::new(since)))
            .await?;

        result.pulled = response.changes.len();
        for change in &response.changes {
            match self.store.apply_remote(change, self.config.conflict_policy) {
                Ok(outcome) => {
                    if outcome.changed_store() {
                        result.applied += 1;
                    }
                    if let Some(conflict) = outcome.conflict() {
                        result.conflicts.push(conflict.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(target_record = %change.target(), error = %e, "skipping remote change");
                    result
                        .errors
                        .push(format!("Apply failed for {}: {e}", change.target()));
                }
            }
        }

        let cursor = self
            .store
            .advance_sync_cursor(response.server_time.unwrap_or(requested_at))?;
        tracing::info!(
            pulled = result.pulled,
            applied = result.applied,
            conflicts = result.conflicts.len(),
            cursor = %cursor,
            "pull complete"
        );
        Ok(())
    }

    fn retention_phase(&self, result: &mut SyncCycleResult) {
        let cutoff = chrono::Duration::from_std(self.config.retention)
            .ok()
            .and_then(|window| self.store.now().checked_sub_signed(window));
        let Some(cutoff) = cutoff else {
            return;
        };

        match self.store.queue().purge_completed(cutoff) {
            Ok(purged) => result.purged = purged,
            Err(e) => {
                tracing::warn!(error = %e, "retention failed");
                result.errors.push(format!("Retention failed: {e}"));
            }
        }
    }

    async fn with_timeout<R>(&self, call: impl Future<Output = SyncResult<R>>) -> SyncResult<R> {
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    fn finish(&self, result: &SyncCycleResult) {
        self.set_state(if result.success {
            SyncState::Synced
        } else {
            SyncState::Error
        });

        let mut stats = self.stats.write();
        if result.success {
            stats.cycles_completed += 1;
            stats.last_error = None;
        } else {
            stats.cycles_failed += 1;
            stats.last_error = result.errors.first().cloned();
        }
        stats.changes_pushed += result.pushed as u64;
        stats.changes_pulled += result.pulled as u64;
        stats.conflicts_encountered += result.conflicts.len() as u64;
        stats.last_sync_time = Some(self.store.now());

        tracing::info!(
            success = result.success,
            pushed = result.pushed,
            pulled = result.pulled,
            purged = result.purged,
            errors = result.errors.len(),
            duration_ms = duration_ms(result.duration),
            "sync run finished"
        );
    }
}

impl<T: SyncTransport> std::fmt::Debug for SyncCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn ids(items: &[QueueItem]) -> Vec<String> {
    items.iter().map(|item| item.id.clone()).collect()
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
