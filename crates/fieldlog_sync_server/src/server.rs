//! Main sync server.

use crate::config::ServerConfig;
use crate::handler::{HandlerContext, RequestHandler};
use crate::log::{ServerChangeLog, StampedChange};
use fieldlog_sync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use std::sync::Arc;

/// An in-memory remote sync endpoint.
///
/// Accepts pushed changes into a [`ServerChangeLog`] and serves them back to
/// pulls. It stands in for the real endpoint in tests and local development.
///
/// # Example
///
/// ```
/// use fieldlog_sync_protocol::PullRequest;
/// use fieldlog_sync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let response = server.handle_pull(PullRequest::new(None)).unwrap();
/// assert!(response.changes.is_empty());
/// ```
#[derive(Debug)]
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        let log = Arc::new(ServerChangeLog::new(Arc::clone(&config.clock)));
        Self::with_log(config, log)
    }

    /// Creates a sync server with an existing change log.
    pub fn with_log(config: ServerConfig, log: Arc<ServerChangeLog>) -> Self {
        let context = Arc::new(HandlerContext::new(config, log));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> Result<PushResponse, String> {
        self.handler.handle_push(request).map_err(|e| e.to_string())
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> Result<PullResponse, String> {
        self.handler.handle_pull(request).map_err(|e| e.to_string())
    }

    /// Handles an HTTP-style request (`POST /sync/push`,
    /// `GET /sync/pull?since=...`) and returns the JSON response body.
    pub fn handle_request(&self, method: &str, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.handler
            .handle_route(method, path, body)
            .map_err(|e| e.to_string())
    }

    /// Returns the change log.
    pub fn log(&self) -> &Arc<ServerChangeLog> {
        &self.context.log
    }

    /// Returns every stored change, oldest first.
    pub fn changes(&self) -> Vec<StampedChange> {
        self.context.log.entries()
    }

    /// Returns the number of stored changes.
    pub fn change_count(&self) -> usize {
        self.context.log.len()
    }
}
