//! Scripted in-process language server for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tether_lsp::codec::{serialize_error_response, serialize_response};
use tether_lsp::{ConnectParams, MemoryConnector, ServerEnd};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the fake server does with a request.
pub enum Reply {
    Result(Value),
    Error(i64, String),
    /// Never answer.
    Silent,
}

type Responder = Arc<dyn Fn(&str, &Value) -> Reply + Send + Sync>;

#[derive(Default)]
struct State {
    /// Every message received, in arrival order, across connections.
    log: Vec<Value>,
    params: Vec<ConnectParams>,
    clients: Vec<mpsc::Sender<String>>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct FakeServer {
    state: Arc<Mutex<State>>,
}

pub fn server_capabilities() -> Value {
    json!({
        "textDocumentSync": 1,
        "completionProvider": {"triggerCharacters": ["."]},
        "definitionProvider": true,
        "renameProvider": true,
        "documentFormattingProvider": true
    })
}

impl FakeServer {
    /// Start a server answering `initialize` itself and every other request
    /// through `responder`.
    pub fn start<F>(responder: F) -> (MemoryConnector, FakeServer)
    where
        F: Fn(&str, &Value) -> Reply + Send + Sync + 'static,
    {
        let (connector, mut ends) = MemoryConnector::new();
        let server = FakeServer {
            state: Arc::new(Mutex::new(State::default())),
        };
        let responder: Responder = Arc::new(responder);
        let accept_state = Arc::clone(&server.state);
        tokio::spawn(async move {
            while let Some(end) = ends.recv().await {
                let task = tokio::spawn(serve(end, Arc::clone(&accept_state), Arc::clone(&responder)));
                accept_state.lock().unwrap().tasks.push(task);
            }
        });
        (connector, server)
    }

    /// A server that leaves every request other than `initialize` unanswered.
    pub fn silent() -> (MemoryConnector, FakeServer) {
        Self::start(|_, _| Reply::Silent)
    }

    pub fn messages(&self) -> Vec<Value> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.messages()
            .iter()
            .filter_map(|m| m["method"].as_str().map(str::to_string))
            .collect()
    }

    pub fn with_method(&self, method: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|m| m["method"] == method)
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.with_method(method).len()
    }

    pub fn connections(&self) -> Vec<ConnectParams> {
        self.state.lock().unwrap().params.clone()
    }

    /// Send raw text to the most recent client.
    pub async fn send_raw(&self, text: impl Into<String>) {
        let client = self.state.lock().unwrap().clients.last().cloned();
        if let Some(client) = client {
            let _ = client.send(text.into()).await;
        }
    }

    pub async fn reply(&self, id: i64, result: Value) {
        self.send_raw(serialize_response(id, result)).await;
    }

    pub async fn publish_diagnostics(&self, uri: &str, diagnostics: Value) {
        self.send_raw(
            json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": {"uri": uri, "diagnostics": diagnostics}
            })
            .to_string(),
        )
        .await;
    }

    /// Drop every live connection from the server side.
    pub fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.clients.clear();
        for task in state.tasks.drain(..) {
            task.abort();
        }
    }

    /// Wait until `method` has been received `count` times.
    pub async fn wait_for(&self, method: &str, count: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(method) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "timed out waiting for {count} x {method}, saw {:?}",
            self.methods()
        );
    }
}

async fn serve(mut end: ServerEnd, state: Arc<Mutex<State>>, responder: Responder) {
    {
        let mut state = state.lock().unwrap();
        state.params.push(end.params.clone());
        state.clients.push(end.outbound.clone());
    }
    while let Some(text) = end.inbound.recv().await {
        let Ok(message) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        state.lock().unwrap().log.push(message.clone());

        let (Some(id), Some(method)) = (message["id"].as_i64(), message["method"].as_str()) else {
            continue;
        };
        let reply = if method == "initialize" {
            Reply::Result(json!({ "capabilities": server_capabilities() }))
        } else {
            responder(method, &message["params"])
        };
        let text = match reply {
            Reply::Result(result) => serialize_response(id, result),
            Reply::Error(code, msg) => serialize_error_response(id, code, &msg),
            Reply::Silent => continue,
        };
        if end.outbound.send(text).await.is_err() {
            break;
        }
    }
}

/// Poll `condition` until it holds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition never became true");
}
