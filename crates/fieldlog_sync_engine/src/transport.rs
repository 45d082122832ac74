//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldlog_sync_protocol::{ChangeItem, PullRequest, PullResponse, PushRequest, PushResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A sync transport handles communication with the remote sync endpoint.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing, etc.).
/// Calls are the only suspension points of a sync run.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Pushes a batch of local changes.
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Pulls changes newer than `request.since`.
    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A mock transport for testing.
///
/// Push and pull answer with programmed responses (an accepting push and an
/// empty pull by default) and record every request.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    push_failure: Mutex<Option<String>>,
    push_response: Mutex<Option<PushResponse>>,
    pull_failure: Mutex<Option<String>>,
    pull_responses: Mutex<VecDeque<PullResponse>>,
    latency: Mutex<Option<Duration>>,
    pushed: Mutex<Vec<Vec<ChangeItem>>>,
    pulls: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            push_failure: Mutex::new(None),
            push_response: Mutex::new(None),
            pull_failure: Mutex::new(None),
            pull_responses: Mutex::new(VecDeque::new()),
            latency: Mutex::new(None),
            pushed: Mutex::new(Vec::new()),
            pulls: Mutex::new(Vec::new()),
        }
    }

    /// Makes every push fail with a transport error carrying `message`.
    pub fn set_push_failure(&self, message: Option<&str>) {
        *self.push_failure.lock() = message.map(str::to_string);
    }

    /// Sets the push response. Without one, pushes are accepted.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Makes every pull fail with a transport error carrying `message`.
    pub fn set_pull_failure(&self, message: Option<&str>) {
        *self.pull_failure.lock() = message.map(str::to_string);
    }

    /// Queues a pull response; once the queue is empty pulls return no
    /// changes.
    pub fn push_pull_response(&self, response: PullResponse) {
        self.pull_responses.lock().push_back(response);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every pushed batch, in call order.
    pub fn pushed_batches(&self) -> Vec<Vec<ChangeItem>> {
        self.pushed.lock().clone()
    }

    /// Returns the `since` value of every pull, in call order.
    pub fn pull_requests(&self) -> Vec<Option<DateTime<Utc>>> {
        self.pulls.lock().clone()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.delay().await;
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.pushed.lock().push(request.changes.clone());

        if let Some(message) = self.push_failure.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }
        Ok(self.push_response.lock().clone().unwrap_or(PushResponse {
            success: true,
            accepted: request.changes.len(),
            error: None,
            server_time: None,
        }))
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.delay().await;
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.pulls.lock().push(request.since);

        if let Some(message) = self.pull_failure.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }
        Ok(self
            .pull_responses
            .lock()
            .pop_front()
            .unwrap_or_else(PullResponse::empty))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
