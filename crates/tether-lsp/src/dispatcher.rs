//! Correlation table and inbound routing.
//!
//! Tracks pending requests by id, settles each exactly once, and decides
//! what happens to server-initiated traffic. Side effects that call back
//! into user code are returned as [`Followup`]s so the caller can run them
//! after releasing its lock on the dispatcher.
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::codec::{serialize_error_response, JsonRpcMessage, RpcError};
use crate::types::PublishDiagnosticsParams;

/// JSON-RPC "method not found".
const METHOD_NOT_FOUND: i64 = -32601;

/// Callback for `textDocument/publishDiagnostics`.
pub type DiagnosticsHandler = Arc<dyn Fn(PublishDiagnosticsParams) + Send + Sync>;

/// How a pending request was settled.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    /// The server replied with a result (`null` if it sent none).
    Success(Value),
    /// The server replied with an error object.
    Error(RpcError),
    /// The connection went away first.
    Closed,
}

/// Work to do once the dispatcher lock is released.
pub enum Followup {
    /// Invoke the diagnostics handler.
    Diagnostics {
        handler: DiagnosticsHandler,
        params: PublishDiagnosticsParams,
    },
    /// Send this text back to the server.
    Reply(String),
}

impl Followup {
    /// Run a diagnostics followup; hand back a reply for the caller to send.
    pub fn run(self) -> Option<String> {
        match self {
            Followup::Diagnostics { handler, params } => {
                handler(params);
                None
            }
            Followup::Reply(text) => Some(text),
        }
    }
}

#[derive(Default)]
pub struct Dispatcher {
    pending: HashMap<i64, oneshot::Sender<DispatchResult>>,
    diagnostics: Option<DiagnosticsHandler>,
}

impl Dispatcher {
    /// An empty correlation table with no diagnostics handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the diagnostics handler, replacing any previous one.
    pub fn set_diagnostics_handler(&mut self, handler: DiagnosticsHandler) {
        self.diagnostics = Some(handler);
    }

    /// Register a pending request and return a receiver for its outcome.
    ///
    /// Ids are never reused while pending; registering a live id is a
    /// caller bug and the earlier waiter is settled as closed.
    pub fn register(&mut self, id: i64) -> oneshot::Receiver<DispatchResult> {
        let (tx, rx) = oneshot::channel();
        if let Some(previous) = self.pending.insert(id, tx) {
            tracing::warn!(id, "request id registered twice");
            let _ = previous.send(DispatchResult::Closed);
        }
        rx
    }

    /// Number of requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether request `id` is still awaiting a reply.
    pub fn is_pending(&self, id: i64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Forget a pending request without settling it.
    pub fn cancel(&mut self, id: i64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Settle every pending request as closed. Returns how many there were.
    pub fn fail_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, sender) in self.pending.drain() {
            let _ = sender.send(DispatchResult::Closed);
        }
        count
    }

    /// Route one inbound message.
    pub fn dispatch(&mut self, message: JsonRpcMessage) -> Option<Followup> {
        match message {
            JsonRpcMessage::Response { id, result, error } => {
                match self.pending.remove(&id) {
                    Some(sender) => {
                        let outcome = match error {
                            Some(err) => DispatchResult::Error(err),
                            None => DispatchResult::Success(result.unwrap_or(Value::Null)),
                        };
                        // The waiter may have given up already.
                        let _ = sender.send(outcome);
                    }
                    None => tracing::debug!(id, "dropping response for unknown request id"),
                }
                None
            }
            JsonRpcMessage::Notification { method, params } => {
                if method != "textDocument/publishDiagnostics" {
                    tracing::trace!(%method, "ignoring notification");
                    return None;
                }
                let Some(params) = PublishDiagnosticsParams::from_value(&params) else {
                    tracing::debug!("malformed publishDiagnostics params");
                    return None;
                };
                match &self.diagnostics {
                    Some(handler) => Some(Followup::Diagnostics {
                        handler: Arc::clone(handler),
                        params,
                    }),
                    None => {
                        tracing::trace!(uri = %params.uri, "no diagnostics handler installed");
                        None
                    }
                }
            }
            JsonRpcMessage::Request { id, method, .. } => {
                tracing::debug!(id, %method, "rejecting server request");
                Some(Followup::Reply(serialize_error_response(
                    id,
                    METHOD_NOT_FOUND,
                    &format!("unsupported method: {method}"),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn response(id: i64, result: Value) -> JsonRpcMessage {
        JsonRpcMessage::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    #[tokio::test]
    async fn register_and_resolve() {
        let mut disp = Dispatcher::new();
        let rx = disp.register(1);
        assert_eq!(disp.pending_count(), 1);

        assert!(disp.dispatch(response(1, serde_json::json!({"key": "value"}))).is_none());
        assert_eq!(disp.pending_count(), 0);

        match rx.await.unwrap() {
            DispatchResult::Success(val) => assert_eq!(val["key"], "value"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolve_error() {
        let mut disp = Dispatcher::new();
        let rx = disp.register(1);
        disp.dispatch(JsonRpcMessage::Response {
            id: 1,
            result: None,
            error: Some(RpcError {
                code: -32600,
                message: "invalid request".into(),
            }),
        });
        match rx.await.unwrap() {
            DispatchResult::Error(err) => {
                assert_eq!(err.code, -32600);
                assert_eq!(err.message, "invalid request");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_result_settles_as_null() {
        let mut disp = Dispatcher::new();
        let rx = disp.register(4);
        disp.dispatch(JsonRpcMessage::Response {
            id: 4,
            result: None,
            error: None,
        });
        assert_eq!(rx.await.unwrap(), DispatchResult::Success(Value::Null));
    }

    #[tokio::test]
    async fn duplicate_response_settles_once() {
        let mut disp = Dispatcher::new();
        let rx = disp.register(2);
        disp.dispatch(response(2, serde_json::json!("first")));
        disp.dispatch(response(2, serde_json::json!("second")));
        assert_eq!(
            rx.await.unwrap(),
            DispatchResult::Success(serde_json::json!("first"))
        );
        assert_eq!(disp.pending_count(), 0);
    }

    #[test]
    fn unknown_id_is_dropped() {
        let mut disp = Dispatcher::new();
        let _rx = disp.register(1);
        assert!(disp.dispatch(response(999, Value::Null)).is_none());
        assert!(disp.is_pending(1));
    }

    #[tokio::test]
    async fn fail_all_drains_table() {
        let mut disp = Dispatcher::new();
        let receivers: Vec<_> = (1..=3).map(|id| disp.register(id)).collect();
        assert_eq!(disp.fail_all(), 3);
        assert_eq!(disp.pending_count(), 0);
        for rx in receivers {
            assert_eq!(rx.await.unwrap(), DispatchResult::Closed);
        }
    }

    #[test]
    fn cancel_removes_entry() {
        let mut disp = Dispatcher::new();
        let _rx = disp.register(5);
        assert!(disp.cancel(5));
        assert!(!disp.cancel(5));
        assert_eq!(disp.pending_count(), 0);
    }

    #[test]
    fn diagnostics_go_to_latest_handler() {
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let mut disp = Dispatcher::new();
        let sink = first.clone();
        disp.set_diagnostics_handler(Arc::new(move |p: PublishDiagnosticsParams| {
            sink.lock().unwrap().push(p.uri)
        }));
        let sink = second.clone();
        disp.set_diagnostics_handler(Arc::new(move |p: PublishDiagnosticsParams| {
            sink.lock().unwrap().push(p.uri)
        }));

        let followup = disp
            .dispatch(JsonRpcMessage::Notification {
                method: "textDocument/publishDiagnostics".into(),
                params: serde_json::json!({"uri": "file:///a.py", "diagnostics": []}),
            })
            .unwrap();
        assert!(followup.run().is_none());

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(*second.lock().unwrap(), vec!["file:///a.py".to_string()]);
    }

    #[test]
    fn other_notifications_are_ignored() {
        let mut disp = Dispatcher::new();
        disp.set_diagnostics_handler(Arc::new(|_: PublishDiagnosticsParams| {
            panic!("should not be called")
        }));
        let followup = disp.dispatch(JsonRpcMessage::Notification {
            method: "window/logMessage".into(),
            params: serde_json::json!({"type": 3, "message": "hi"}),
        });
        assert!(followup.is_none());
    }

    #[test]
    fn server_requests_get_method_not_found() {
        let mut disp = Dispatcher::new();
        let reply = disp
            .dispatch(JsonRpcMessage::Request {
                id: 7,
                method: "workspace/configuration".into(),
                params: Value::Null,
            })
            .and_then(Followup::run)
            .unwrap();
        let value: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["error"]["code"], METHOD_NOT_FOUND);
    }
}
