//! In-process transports.
//!
//! Wires sync coordinators to the reference server without a network, and
//! wraps transports to observe how often they are called.

use async_trait::async_trait;
use fieldlog_core::Store;
use fieldlog_sync_engine::{
    HttpTransport, LoopbackClient, LoopbackServer, SyncConfig, SyncCoordinator, SyncResult,
    SyncTransport,
};
use fieldlog_sync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use fieldlog_sync_server::SyncServer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Routes loopback requests to a shared [`SyncServer`].
#[derive(Debug, Clone)]
pub struct ServerEndpoint(pub Arc<SyncServer>);

impl LoopbackServer for ServerEndpoint {
    fn handle_request(&self, method: &str, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.0.handle_request(method, path, body)
    }
}

/// An HTTP transport talking to an in-process server.
pub type ServerTransport = HttpTransport<LoopbackClient<ServerEndpoint>>;

/// Creates a transport for `server`.
pub fn server_transport(server: &Arc<SyncServer>) -> ServerTransport {
    HttpTransport::new(
        "http://loopback",
        LoopbackClient::new(ServerEndpoint(Arc::clone(server))),
    )
}

/// Creates a coordinator over `store` that syncs with `server`.
pub fn device(
    server: &Arc<SyncServer>,
    store: Arc<Store>,
    config: SyncConfig,
) -> SyncCoordinator<ServerTransport> {
    SyncCoordinator::new(store, server_transport(server), config)
}

/// A transport wrapper that counts calls.
#[derive(Debug, Default)]
pub struct CountingTransport<T> {
    inner: T,
    pushes: AtomicUsize,
    pulls: AtomicUsize,
}

impl<T: SyncTransport> CountingTransport<T> {
    /// Wraps `inner`.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            pushes: AtomicUsize::new(0),
            pulls: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Returns the number of push calls.
    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    /// Returns the number of pull calls.
    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: SyncTransport> SyncTransport for CountingTransport<T> {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.inner.push(request).await
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.inner.pull(request).await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}
