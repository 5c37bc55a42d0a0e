//! One duplex channel to a language server for a `(workspace, language)`.
//!
//! The connection owns the correlation table, the `initialize` /
//! `initialized` handshake and the per-document version counters. It is
//! shared as `Arc<Connection>`; every method takes `&self`.
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use crate::codec::{parse_message, serialize_notification, serialize_request};
use crate::dispatcher::{DispatchResult, Dispatcher, Followup};
use crate::error::LspError;
use crate::lock;
use crate::transport::{ConnectParams, Connector, Duplex};
use crate::types::{client_capabilities, PublishDiagnosticsParams, ServerCapabilities};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Handshaking,
    Ready,
    /// Disposed. `open()` starts over from here.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Ready => "ready",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of the in-flight handshake, shared with concurrent `open()` calls.
type HandshakeOutcome = Option<Result<(), String>>;

enum Phase {
    Uninitialized,
    /// `epoch` identifies the handshake so a stale leader cannot finish a
    /// newer one.
    Handshaking {
        epoch: u64,
        outcome: watch::Receiver<HandshakeOutcome>,
    },
    Ready,
    Closed,
}

impl Phase {
    fn is_handshake(&self, epoch: u64) -> bool {
        matches!(self, Phase::Handshaking { epoch: current, .. } if *current == epoch)
    }

    fn state(&self) -> ConnectionState {
        match self {
            Phase::Uninitialized => ConnectionState::Uninitialized,
            Phase::Handshaking { .. } => ConnectionState::Handshaking,
            Phase::Ready => ConnectionState::Ready,
            Phase::Closed => ConnectionState::Closed,
        }
    }
}

struct Inner {
    phase: Phase,
    outbound: Option<mpsc::Sender<String>>,
    /// Bumped whenever a transport is attached or dropped, so a reader
    /// task for an old transport cannot touch the current one.
    generation: u64,
    /// Bumped for every handshake a leader starts.
    epoch: u64,
    capabilities: ServerCapabilities,
}

struct Shared {
    label: String,
    inner: Mutex<Inner>,
    dispatcher: Mutex<Dispatcher>,
}

impl Shared {
    /// Install the transport for handshake `epoch` and return its
    /// generation. `None` when that handshake was abandoned meanwhile.
    fn attach(self: &Arc<Self>, epoch: u64, duplex: Duplex) -> Option<u64> {
        let Duplex { outbound, inbound } = duplex;
        let generation = {
            let mut inner = lock(&self.inner);
            if !inner.phase.is_handshake(epoch) {
                return None;
            }
            inner.generation += 1;
            inner.outbound = Some(outbound);
            inner.generation
        };
        tokio::spawn(read_loop(Arc::clone(self), generation, inbound));
        Some(generation)
    }

    /// Drop the transport and fail everything pending on it.
    ///
    /// Called with `inner` locked so no request can register against the
    /// old transport after the drain.
    fn detach(&self, inner: &mut Inner) -> usize {
        inner.generation += 1;
        inner.outbound = None;
        lock(&self.dispatcher).fail_all()
    }

    fn outbound_for(&self, generation: u64) -> Option<mpsc::Sender<String>> {
        let inner = lock(&self.inner);
        if inner.generation == generation {
            inner.outbound.clone()
        } else {
            None
        }
    }

    fn transport_ended(&self, generation: u64) {
        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            return;
        }
        let failed = self.detach(&mut inner);
        // A running handshake notices through its failed initialize request.
        if matches!(inner.phase, Phase::Ready) {
            inner.phase = Phase::Uninitialized;
        }
        tracing::warn!(
            connection = %self.label,
            failed_requests = failed,
            "language server transport ended"
        );
    }

    fn finish_handshake(&self, epoch: u64, outcome: Result<(), LspError>) -> Result<(), LspError> {
        let mut inner = lock(&self.inner);
        if !inner.phase.is_handshake(epoch) {
            // Disposed, and possibly reopened, while the handshake ran.
            return outcome.and(Err(LspError::ConnectionClosed));
        }
        let outcome = match outcome {
            Ok(()) if inner.outbound.is_none() => Err(LspError::ConnectionClosed),
            other => other,
        };
        match &outcome {
            Ok(()) => inner.phase = Phase::Ready,
            Err(_) => {
                self.detach(&mut inner);
                inner.phase = Phase::Uninitialized;
            }
        }
        outcome
    }
}

async fn read_loop(shared: Arc<Shared>, generation: u64, mut inbound: mpsc::Receiver<String>) {
    while let Some(text) = inbound.recv().await {
        let message = match parse_message(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(connection = %shared.label, error = %e, "dropping malformed message");
                continue;
            }
        };
        let followup = lock(&shared.dispatcher).dispatch(message);
        if let Some(reply) = followup.and_then(Followup::run) {
            match shared.outbound_for(generation) {
                Some(outbound) => {
                    let _ = outbound.send(reply).await;
                }
                None => break,
            }
        }
    }
    shared.transport_ended(generation);
}

/// Resets a handshake whose leader future was dropped before finishing.
struct HandshakeGuard<'a> {
    shared: &'a Shared,
    epoch: u64,
    armed: bool,
}

impl Drop for HandshakeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = lock(&self.shared.inner);
        if inner.phase.is_handshake(self.epoch) {
            self.shared.detach(&mut inner);
            inner.phase = Phase::Uninitialized;
        }
    }
}

/// Removes a request's pending entry however its wait ends.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: i64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.shared.dispatcher).cancel(self.id);
    }
}

/// Per-document bookkeeping on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSession {
    pub language_id: String,
    /// 1 after `didOpen`, +1 per `didChange`.
    pub version: i64,
    pub text: String,
}

enum Role {
    Leader(u64, watch::Sender<HandshakeOutcome>),
    Waiter(watch::Receiver<HandshakeOutcome>),
}

/// A language-server connection with its handshake, correlation table and
/// document sessions.
pub struct Connection {
    params: ConnectParams,
    connector: Arc<dyn Connector>,
    request_timeout: Option<Duration>,
    next_id: AtomicI64,
    shared: Arc<Shared>,
    documents: tokio::sync::Mutex<HashMap<String, DocumentSession>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("params", &self.params)
            .field("state", &self.state())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection. Nothing is sent until [`Connection::open`].
    pub fn new(
        params: ConnectParams,
        connector: Arc<dyn Connector>,
        request_timeout: Option<Duration>,
    ) -> Self {
        let label = format!("{}/{}", params.workspace_id, params.language_id);
        Self {
            params,
            connector,
            request_timeout,
            next_id: AtomicI64::new(1),
            shared: Arc::new(Shared {
                label,
                inner: Mutex::new(Inner {
                    phase: Phase::Uninitialized,
                    outbound: None,
                    generation: 0,
                    epoch: 0,
                    capabilities: ServerCapabilities::default(),
                }),
                dispatcher: Mutex::new(Dispatcher::new()),
            }),
            documents: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Workspace this connection serves.
    pub fn workspace_id(&self) -> &str {
        &self.params.workspace_id
    }

    /// Language this connection serves.
    pub fn language_id(&self) -> &str {
        &self.params.language_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.inner).phase.state()
    }

    /// Whether the handshake has completed on the current transport.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Capabilities from the last successful handshake.
    pub fn capabilities(&self) -> ServerCapabilities {
        lock(&self.shared.inner).capabilities.clone()
    }

    /// Requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        lock(&self.shared.dispatcher).pending_count()
    }

    /// Install the handler for `textDocument/publishDiagnostics`.
    ///
    /// Only one handler is kept; installing another replaces it.
    pub fn on_diagnostics<F>(&self, handler: F)
    where
        F: Fn(PublishDiagnosticsParams) + Send + Sync + 'static,
    {
        lock(&self.shared.dispatcher).set_diagnostics_handler(Arc::new(handler));
    }

    /// Connect and run the handshake unless already ready.
    ///
    /// Concurrent callers share one handshake and see the same outcome. On
    /// failure the connection returns to `Uninitialized` and may be retried.
    pub async fn open(&self) -> Result<(), LspError> {
        let role = {
            let mut inner = lock(&self.shared.inner);
            match &inner.phase {
                Phase::Ready => return Ok(()),
                Phase::Handshaking { outcome, .. } => Role::Waiter(outcome.clone()),
                Phase::Uninitialized | Phase::Closed => {
                    let (tx, rx) = watch::channel(None);
                    inner.epoch += 1;
                    let epoch = inner.epoch;
                    inner.phase = Phase::Handshaking { epoch, outcome: rx };
                    Role::Leader(epoch, tx)
                }
            }
        };

        match role {
            Role::Waiter(rx) => wait_for_handshake(rx).await,
            Role::Leader(epoch, tx) => {
                let mut guard = HandshakeGuard {
                    shared: &self.shared,
                    epoch,
                    armed: true,
                };
                let outcome = self.handshake(epoch).await;
                guard.armed = false;
                let outcome = self.shared.finish_handshake(epoch, outcome);
                match &outcome {
                    Ok(()) => tracing::info!(connection = %self.shared.label, "language server ready"),
                    Err(e) => tracing::warn!(connection = %self.shared.label, error = %e, "handshake failed"),
                }
                let _ = tx.send(Some(outcome.as_ref().map(|_| ()).map_err(ToString::to_string)));
                outcome
            }
        }
    }

    async fn handshake(&self, epoch: u64) -> Result<(), LspError> {
        tracing::info!(connection = %self.shared.label, epoch, "starting handshake");
        let duplex = self.connector.connect(&self.params).await?;
        let generation = self
            .shared
            .attach(epoch, duplex)
            .ok_or(LspError::ConnectionClosed)?;

        let result = self
            .send_request(Some(generation), "initialize", self.initialize_params())
            .await
            .map_err(|e| match e {
                LspError::ConnectionClosed => e,
                other => LspError::HandshakeFailed(other.to_string()),
            })?;
        let capabilities = result
            .get("capabilities")
            .map(ServerCapabilities::from_value)
            .unwrap_or_default();
        lock(&self.shared.inner).capabilities = capabilities;

        if !self
            .send_notification(Some(generation), "initialized", json!({}))
            .await
        {
            return Err(LspError::ConnectionClosed);
        }

        // Sessions outlive a dropped transport; tell the new server about them.
        let documents = self.documents.lock().await;
        for (uri, session) in documents.iter() {
            self.send_notification(
                Some(generation),
                "textDocument/didOpen",
                did_open_params(uri, session),
            )
            .await;
        }
        Ok(())
    }

    fn initialize_params(&self) -> Value {
        json!({
            "processId": std::process::id(),
            "rootUri": self.params.root_uri,
            "workspaceFolders": [{
                "uri": self.params.root_uri,
                "name": self.params.workspace_id
            }],
            "capabilities": client_capabilities(),
            "clientInfo": {
                "name": "tether",
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    /// Send a notification. Returns `false`, without error, when there is
    /// no open transport to send it on.
    pub async fn notify(&self, method: &str, params: Value) -> bool {
        self.send_notification(None, method, params).await
    }

    /// Notify on the current transport, or only on transport `generation`
    /// when one is given.
    async fn send_notification(&self, generation: Option<u64>, method: &str, params: Value) -> bool {
        let outbound = match generation {
            Some(generation) => self.shared.outbound_for(generation),
            None => lock(&self.shared.inner).outbound.clone(),
        };
        let Some(outbound) = outbound else {
            tracing::debug!(connection = %self.shared.label, %method, "notification dropped, not connected");
            return false;
        };
        outbound
            .send(serialize_notification(method, params))
            .await
            .is_ok()
    }

    /// Send a request and wait for its reply.
    ///
    /// Fails with `ConnectionClosed` if the transport goes away first and
    /// with `Timeout` if the configured deadline passes; only this request
    /// is affected in either case.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, LspError> {
        self.send_request(None, method, params).await
    }

    /// Request on the current transport, or only on transport `generation`
    /// when one is given.
    async fn send_request(
        &self,
        generation: Option<u64>,
        method: &str,
        params: Value,
    ) -> Result<Value, LspError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbound, rx) = {
            let inner = lock(&self.shared.inner);
            if generation.is_some_and(|g| g != inner.generation) {
                return Err(LspError::ConnectionClosed);
            }
            let outbound = inner.outbound.clone().ok_or(LspError::NotConnected)?;
            (outbound, lock(&self.shared.dispatcher).register(id))
        };
        let _pending = PendingGuard {
            shared: &self.shared,
            id,
        };

        tracing::trace!(connection = %self.shared.label, id, %method, "request");
        outbound
            .send(serialize_request(id, method, params))
            .await
            .map_err(|_| LspError::ConnectionClosed)?;
        drop(outbound);

        let settled = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(settled) => settled,
                Err(_) => {
                    tracing::warn!(connection = %self.shared.label, id, %method, "request timed out");
                    return Err(LspError::Timeout(limit));
                }
            },
            None => rx.await,
        };

        match settled {
            Ok(DispatchResult::Success(value)) => Ok(value),
            Ok(DispatchResult::Error(err)) => Err(LspError::Rpc {
                code: err.code,
                message: err.message,
            }),
            Ok(DispatchResult::Closed) | Err(_) => Err(LspError::ConnectionClosed),
        }
    }

    /// Open `uri` on the server with version 1.
    ///
    /// Opening an already open document closes it first.
    pub async fn did_open(&self, uri: &str, language_id: &str, text: &str) -> Result<(), LspError> {
        self.open().await?;
        let mut documents = self.documents.lock().await;
        if documents.remove(uri).is_some() {
            self.notify("textDocument/didClose", json!({ "textDocument": { "uri": uri } }))
                .await;
        }
        let session = DocumentSession {
            language_id: language_id.to_string(),
            version: 1,
            text: text.to_string(),
        };
        self.notify("textDocument/didOpen", did_open_params(uri, &session))
            .await;
        documents.insert(uri.to_string(), session);
        Ok(())
    }

    /// Replace the full text of `uri` and return the new version.
    pub async fn did_change(&self, uri: &str, text: &str) -> Result<i64, LspError> {
        self.open().await?;
        let mut documents = self.documents.lock().await;
        let session = documents
            .get_mut(uri)
            .ok_or_else(|| LspError::DocumentNotOpen(uri.to_string()))?;
        session.version += 1;
        session.text = text.to_string();
        let version = session.version;
        self.notify(
            "textDocument/didChange",
            json!({
                "textDocument": { "uri": uri, "version": version },
                "contentChanges": [{ "text": text }]
            }),
        )
        .await;
        Ok(version)
    }

    /// Forget `uri`. Returns whether it was open.
    pub async fn did_close(&self, uri: &str) -> bool {
        let mut documents = self.documents.lock().await;
        if documents.remove(uri).is_none() {
            return false;
        }
        self.notify("textDocument/didClose", json!({ "textDocument": { "uri": uri } }))
            .await;
        true
    }

    /// Session for `uri`, if it is open on this connection.
    pub async fn document(&self, uri: &str) -> Option<DocumentSession> {
        self.documents.lock().await.get(uri).cloned()
    }

    /// Close the transport and fail every pending request.
    pub fn dispose(&self) {
        let mut inner = lock(&self.shared.inner);
        let failed = self.shared.detach(&mut inner);
        inner.phase = Phase::Closed;
        tracing::debug!(connection = %self.shared.label, failed_requests = failed, "connection disposed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let mut inner = lock(&self.shared.inner);
        self.shared.detach(&mut inner);
    }
}

async fn wait_for_handshake(mut rx: watch::Receiver<HandshakeOutcome>) -> Result<(), LspError> {
    loop {
        let current = rx.borrow().clone();
        if let Some(outcome) = current {
            return outcome.map_err(LspError::HandshakeFailed);
        }
        if rx.changed().await.is_err() {
            return Err(LspError::HandshakeFailed("handshake abandoned".into()));
        }
    }
}

fn did_open_params(uri: &str, session: &DocumentSession) -> Value {
    json!({
        "textDocument": {
            "uri": uri,
            "languageId": session.language_id,
            "version": session.version,
            "text": session.text
        }
    })
}
