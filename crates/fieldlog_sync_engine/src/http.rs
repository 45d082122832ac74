//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the sync engine.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, an in-process loopback, etc.).

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use fieldlog_sync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse, WireMessage};
use parking_lot::RwLock;
use std::sync::Arc;

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Errors are
/// plain messages; the transport turns them into retryable
/// [`SyncError::Transport`] errors.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body.
    async fn get(&self, url: &str) -> Result<Vec<u8>, String>;

    /// Sends a POST request with a JSON body and returns the response body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based sync transport.
///
/// Uses JSON bodies:
/// - `POST {base}/sync/push` with a [`PushRequest`]
/// - `GET {base}/sync/pull?since=<timestamp>`
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync endpoint (e.g., "https://sync.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn record<T>(&self, result: Result<T, String>) -> SyncResult<T> {
        match result {
            Ok(value) => {
                *self.last_error.write() = None;
                Ok(value)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.clone());
                Err(SyncError::transport_retryable(e))
            }
        }
    }

    fn decode<Res: WireMessage>(bytes: &[u8]) -> SyncResult<Res> {
        Res::decode(bytes).map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let body = request
            .encode()
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;
        let url = format!("{}/sync/push", self.base_url);
        let response = self.record(self.client.post(&url, body).await)?;
        Self::decode(&response)
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let query = request.to_query();
        let url = if query.is_empty() {
            format!("{}/sync/pull", self.base_url)
        } else {
            format!("{}/sync/pull?{query}", self.base_url)
        };
        let response = self.record(self.client.get(&url).await)?;
        Self::decode(&response)
    }

    fn is_connected(&self) -> bool {
        self.client.is_healthy()
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request for `path` (including any query string) and returns
    /// the response body.
    fn handle_request(&self, method: &str, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle_request(&self, method: &str, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        (**self).handle_request(method, path, body)
    }
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }

    // The route is the last `/sync/` segment, so bases may contain `/sync/` too.
    fn path(url: &str) -> &str {
        let route_end = url.find('?').unwrap_or(url.len());
        url[..route_end].rfind("/sync/").map_or(url, |i| &url[i..])
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn get(&self, url: &str) -> Result<Vec<u8>, String> {
        self.server.handle_request("GET", Self::path(url), &[])
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server.handle_request("POST", Self::path(url), &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
