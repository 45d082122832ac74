//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::log::ServerChangeLog;
use fieldlog_sync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse, WireMessage};
use std::sync::Arc;

/// Context for request handling.
#[derive(Debug)]
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Change log (shared across all handlers).
    pub log: Arc<ServerChangeLog>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, log: Arc<ServerChangeLog>) -> Self {
        Self { config, log }
    }
}

/// Handler for sync requests.
#[derive(Debug)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        let size = request.changes.len();
        let max = self.context.config.max_push_batch;
        if size > max {
            return Err(ServerError::BatchTooLarge { size, max });
        }
        if let Some(change) = request.changes.iter().find(|c| c.record_id.is_empty()) {
            return Err(ServerError::InvalidRequest(format!(
                "change {} has no record id",
                change.id
            )));
        }

        let stored = self.context.log.append(request.changes);
        let server_time = self.context.log.observe();
        tracing::debug!(received = size, stored, "push handled");
        Ok(PushResponse::success(size, server_time))
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        let server_time = self.context.log.observe();
        let changes = self.context.log.changes_since(request.since);
        tracing::debug!(since = ?request.since, changes = changes.len(), "pull handled");
        Ok(PullResponse::new(changes, Some(server_time)))
    }

    /// Routes an HTTP-style request and returns the JSON response body.
    ///
    /// Client errors on push are answered with an unsuccessful
    /// [`PushResponse`] rather than an error.
    pub fn handle_route(&self, method: &str, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let (route, query) = path.split_once('?').unwrap_or((path, ""));
        match (method, route) {
            ("POST", "/sync/push") => {
                let response = match PushRequest::decode(body)
                    .map_err(ServerError::from)
                    .and_then(|request| self.handle_push(request))
                {
                    Ok(response) => response,
                    Err(e) if e.is_client_error() => {
                        tracing::warn!(error = %e, "push rejected");
                        PushResponse::error(e.to_string())
                    }
                    Err(e) => return Err(e),
                };
                Ok(response.encode()?)
            }
            ("GET", "/sync/pull") => {
                let request = PullRequest::from_query(query)?;
                Ok(self.handle_pull(request)?.encode()?)
            }
            _ => Err(ServerError::NotFound {
                method: method.to_string(),
                path: route.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlog_sync_protocol::{ChangeAction, ChangeItem, ManualClock};
    use serde_json::json;

    fn create_handler(max_push_batch: usize) -> RequestHandler {
        let clock = Arc::new(ManualClock::at_rfc3339("2024-05-01T06:00:00Z").unwrap());
        let config = ServerConfig::new()
            .with_max_push_batch(max_push_batch)
            .with_clock(clock.clone());
        let log = Arc::new(ServerChangeLog::new(clock));
        RequestHandler::new(Arc::new(HandlerContext::new(config, log)))
    }

    fn change(record_id: &str) -> ChangeItem {
        ChangeItem::new(ChangeAction::Create, "users", record_id, json!({"id": record_id}))
    }

    #[test]
    fn pull_empty() {
        let handler = create_handler(10);
        let response = handler.handle_pull(PullRequest::new(None)).unwrap();
        assert!(response.changes.is_empty());
        assert!(response.server_time.is_some());
    }

    #[test]
    fn push_and_pull() {
        let handler = create_handler(10);
        let before = handler.handle_pull(PullRequest::new(None)).unwrap().server_time;

        let push = handler
            .handle_push(PushRequest::new(vec![change("a"), change("b")]))
            .unwrap();
        assert!(push.success);
        assert_eq!(push.accepted, 2);

        let pulled = handler.handle_pull(PullRequest::new(before)).unwrap();
        assert_eq!(pulled.changes.len(), 2);

        let again = handler.handle_pull(PullRequest::new(pulled.server_time)).unwrap();
        assert!(again.changes.is_empty());
    }

    #[test]
    fn push_batch_limit() {
        let handler = create_handler(1);
        let err = handler
            .handle_push(PushRequest::new(vec![change("a"), change("b")]))
            .unwrap_err();
        assert!(matches!(err, ServerError::BatchTooLarge { size: 2, max: 1 }));
    }

    #[test]
    fn route_push_rejection_is_a_response() {
        let handler = create_handler(1);
        let body = PushRequest::new(vec![change("a"), change("b")]).encode().unwrap();
        let bytes = handler.handle_route("POST", "/sync/push", &body).unwrap();

        let response = PushResponse::decode(&bytes).unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("too many changes: 2 > 1"));
    }

    #[test]
    fn route_pull_with_query() {
        let handler = create_handler(10);
        handler.handle_push(PushRequest::new(vec![change("a")])).unwrap();

        let bytes = handler
            .handle_route("GET", "/sync/pull?since=2024-05-01T05%3A00%3A00.000Z", &[])
            .unwrap();
        assert_eq!(PullResponse::decode(&bytes).unwrap().changes.len(), 1);
    }

    #[test]
    fn unknown_route() {
        let handler = create_handler(10);
        let err = handler.handle_route("DELETE", "/sync/push", &[]).unwrap_err();
        assert!(matches!(err, ServerError::NotFound { .. }));
    }
}
