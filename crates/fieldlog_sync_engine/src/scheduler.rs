//! Automatic sync.
//!
//! Once started, a background task runs [`SyncCoordinator::run_sync`] on a
//! fixed interval and whenever the network comes back online, but only while
//! the device is online and a user session is active. Stopping only prevents
//! future runs; a run already in flight completes.

use crate::coordinator::SyncCoordinator;
use crate::error::SyncError;
use crate::transport::SyncTransport;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A snapshot of the conditions that gate automatic sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connectivity {
    /// The device has network access.
    pub online: bool,
    /// A user is signed in.
    pub session_active: bool,
}

impl Connectivity {
    /// Returns true if automatic sync may run.
    pub fn can_sync(&self) -> bool {
        self.online && self.session_active
    }
}

/// Shared, observable connectivity state.
///
/// Clones share the same state. Defaults to online without a session.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    tx: Arc<watch::Sender<Connectivity>>,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl NetworkStatus {
    /// Creates a status with the given initial values.
    pub fn new(online: bool, session_active: bool) -> Self {
        let (tx, _) = watch::channel(Connectivity {
            online,
            session_active,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Reports whether the device is online.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|c| {
            let changed = c.online != online;
            c.online = online;
            changed
        });
    }

    /// Reports whether a user session is active.
    pub fn set_session_active(&self, active: bool) {
        self.tx.send_if_modified(|c| {
            let changed = c.session_active != active;
            c.session_active = active;
            changed
        });
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    /// Returns true if the device is online.
    pub fn is_online(&self) -> bool {
        self.current().online
    }

    /// Returns true if a user session is active.
    pub fn has_session(&self) -> bool {
        self.current().session_active
    }

    /// Subscribes to changes.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

pub(crate) struct AutoSyncTask {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Interval,
    Reconnected,
}

impl<T: SyncTransport + 'static> SyncCoordinator<T> {
    /// Starts automatic sync.
    ///
    /// An initial run happens right away if sync is allowed. Returns false
    /// without changing anything if automatic sync is already running or
    /// `interval` is zero. Must be called within a Tokio runtime.
    pub fn start_auto_sync(self: &Arc<Self>, interval: Duration) -> bool {
        if interval.is_zero() {
            tracing::warn!("auto sync not started, interval must be non-zero");
            return false;
        }
        let mut slot = self.auto_sync.lock();
        if slot.as_ref().is_some_and(|auto| !auto.task.is_finished()) {
            return false;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(auto_sync_loop(
            Arc::downgrade(self),
            self.network().subscribe(),
            stop_rx,
            interval,
        ));
        *slot = Some(AutoSyncTask {
            stop: stop_tx,
            task,
        });
        tracing::info!(interval_secs = interval.as_secs(), "auto sync started");
        true
    }

    /// Stops automatic sync. Returns false if it was not running.
    pub fn stop_auto_sync(&self) -> bool {
        let Some(auto) = self.auto_sync.lock().take() else {
            return false;
        };
        let _ = auto.stop.send(());
        tracing::info!("auto sync stopped");
        true
    }

    /// Returns true if automatic sync is running.
    pub fn is_auto_sync_running(&self) -> bool {
        self.auto_sync
            .lock()
            .as_ref()
            .is_some_and(|auto| !auto.task.is_finished())
    }
}

async fn auto_sync_loop<T: SyncTransport + 'static>(
    coordinator: Weak<SyncCoordinator<T>>,
    mut network: watch::Receiver<Connectivity>,
    mut stop: oneshot::Receiver<()>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut was_online = network.borrow_and_update().online;

    loop {
        let trigger = tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => Trigger::Interval,
            changed = network.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = network.borrow_and_update().online;
                let reconnected = online && !was_online;
                was_online = online;
                if !reconnected {
                    continue;
                }
                Trigger::Reconnected
            }
        };

        let Some(sync) = coordinator.upgrade() else {
            break;
        };
        if !sync.network().current().can_sync() {
            tracing::trace!(?trigger, "auto sync skipped, offline or signed out");
            continue;
        }

        tracing::debug!(?trigger, "auto sync run");
        match sync.run_sync().await {
            Ok(result) if !result.success => {
                tracing::warn!(errors = ?result.errors, "auto sync run finished with errors");
            }
            Ok(_) => {}
            Err(SyncError::AlreadyRunning) => {
                tracing::debug!("auto sync skipped, run in flight");
            }
            Err(e) => tracing::warn!(error = %e, "auto sync run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::transport::MockTransport;
    use fieldlog_core::Store;

    const INTERVAL: Duration = Duration::from_secs(300);

    fn coordinator(network: NetworkStatus) -> Arc<SyncCoordinator<MockTransport>> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        Arc::new(
            SyncCoordinator::new(store, MockTransport::new(), SyncConfig::default())
                .with_network(network),
        )
    }

    fn runs(sync: &SyncCoordinator<MockTransport>) -> usize {
        sync.transport().pull_requests().len()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[test]
    fn network_status_is_shared() {
        let status = NetworkStatus::default();
        let clone = status.clone();
        assert!(status.is_online());
        assert!(!status.has_session());

        clone.set_session_active(true);
        clone.set_online(false);
        assert!(status.has_session());
        assert!(!status.is_online());
        assert!(!status.current().can_sync());
    }

    #[tokio::test(start_paused = true)]
    async fn initial_run_and_interval() {
        let sync = coordinator(NetworkStatus::new(true, true));
        assert!(sync.start_auto_sync(INTERVAL));
        settle().await;
        assert_eq!(runs(&sync), 1);

        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(runs(&sync), 4);
        assert!(sync.stop_auto_sync());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_noop() {
        let sync = coordinator(NetworkStatus::new(true, true));
        assert!(sync.start_auto_sync(INTERVAL));
        assert!(!sync.start_auto_sync(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs(&sync), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_rejected() {
        let sync = coordinator(NetworkStatus::new(true, true));
        assert!(!sync.start_auto_sync(Duration::ZERO));
        assert!(!sync.is_auto_sync_running());
        settle().await;
        assert_eq!(runs(&sync), 0);

        assert!(sync.start_auto_sync(INTERVAL));
        settle().await;
        assert_eq!(runs(&sync), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_runs_without_session() {
        let sync = coordinator(NetworkStatus::new(true, false));
        sync.start_auto_sync(INTERVAL);
        settle().await;
        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(runs(&sync), 0);

        sync.network().set_session_active(true);
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(runs(&sync), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_triggers_run() {
        let sync = coordinator(NetworkStatus::new(false, true));
        sync.start_auto_sync(INTERVAL);
        settle().await;
        assert_eq!(runs(&sync), 0);

        sync.network().set_online(true);
        settle().await;
        assert_eq!(runs(&sync), 1);

        sync.network().set_online(false);
        settle().await;
        assert_eq!(runs(&sync), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_future_runs() {
        let sync = coordinator(NetworkStatus::new(true, true));
        sync.start_auto_sync(INTERVAL);
        settle().await;
        assert!(sync.stop_auto_sync());
        assert!(!sync.stop_auto_sync());

        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(runs(&sync), 1);
        assert!(!sync.is_auto_sync_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_inflight_run_finish() {
        let sync = coordinator(NetworkStatus::new(true, true));
        sync.transport().set_latency(Some(Duration::from_secs(2)));
        sync.start_auto_sync(INTERVAL);
        settle().await;
        assert!(sync.is_running());

        sync.stop_auto_sync();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!sync.is_running());
        assert_eq!(runs(&sync), 1);
        assert!(sync.store().sync_cursor().unwrap().is_some());
    }
}
