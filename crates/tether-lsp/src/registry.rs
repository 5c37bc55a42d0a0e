//! Connection registry for the active workspace.
//!
//! Holds at most one [`Connection`] per language id. Connections are created
//! lazily by [`ConnectionRegistry::ensure`] and all torn down together when
//! the workspace changes.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_core::uri::{workspace_uri, DEFAULT_WORKSPACE_ROOT};

use crate::connection::Connection;
use crate::diagnostics::{source_tag, DiagnosticsRouter};
use crate::lock;
use crate::transport::{ConnectParams, Connector};

/// Settings applied to every connection the registry creates.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Directory under which workspaces live, e.g. `/workspaces`.
    pub workspace_root: String,
    /// `None` disables the per-request deadline.
    pub request_timeout: Option<Duration>,
    pub token: Option<String>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            workspace_root: DEFAULT_WORKSPACE_ROOT.to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            token: None,
        }
    }
}

struct RegistryState {
    workspace_id: String,
    connections: HashMap<String, Arc<Connection>>,
}

/// At most one [`Connection`] per language for the active workspace.
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    options: RegistryOptions,
    router: Option<Arc<DiagnosticsRouter>>,
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    /// Create an empty registry for `workspace_id`.
    pub fn new(
        workspace_id: impl Into<String>,
        connector: Arc<dyn Connector>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            connector,
            options,
            router: None,
            state: Mutex::new(RegistryState {
                workspace_id: workspace_id.into(),
                connections: HashMap::new(),
            }),
        }
    }

    /// Route diagnostics of every connection created from now on.
    pub fn with_router(mut self, router: Arc<DiagnosticsRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// The active workspace.
    pub fn workspace_id(&self) -> String {
        lock(&self.state).workspace_id.clone()
    }

    /// Options every new connection is built with.
    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Whether the connector can reach a server for `language_id`.
    pub fn supports(&self, language_id: &str) -> bool {
        self.connector.supports(language_id)
    }

    /// The connection for `language_id`, creating it if needed.
    ///
    /// Asking for a different workspace than the active one disposes every
    /// held connection first. The returned connection may not be open yet.
    pub fn ensure(&self, workspace_id: &str, language_id: &str) -> Arc<Connection> {
        let (connection, stale) = {
            let mut state = lock(&self.state);
            let stale = if state.workspace_id != workspace_id {
                tracing::info!(from = %state.workspace_id, to = %workspace_id, "switching workspace");
                state.workspace_id = workspace_id.to_string();
                state.connections.drain().map(|(_, c)| c).collect()
            } else {
                Vec::new()
            };

            let connection = match state.connections.get(language_id) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let created = Arc::new(self.create(workspace_id, language_id));
                    state
                        .connections
                        .insert(language_id.to_string(), Arc::clone(&created));
                    created
                }
            };
            (connection, stale)
        };
        for old in stale {
            old.dispose();
        }
        connection
    }

    fn create(&self, workspace_id: &str, language_id: &str) -> Connection {
        let params = ConnectParams {
            workspace_id: workspace_id.to_string(),
            language_id: language_id.to_string(),
            root_uri: workspace_uri(&self.options.workspace_root, workspace_id),
            token: self.options.token.clone(),
        };
        let connection = Connection::new(params, Arc::clone(&self.connector), self.options.request_timeout);
        if let Some(router) = &self.router {
            let router = Arc::clone(router);
            let tag = source_tag(language_id);
            connection.on_diagnostics(move |params| {
                router.publish(&tag, params);
            });
        }
        tracing::debug!(workspace = %workspace_id, language = %language_id, "connection created");
        connection
    }

    /// The existing connection for `language_id`, if any.
    pub fn get(&self, language_id: &str) -> Option<Arc<Connection>> {
        lock(&self.state).connections.get(language_id).cloned()
    }

    /// Language ids with a connection, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = lock(&self.state).connections.keys().cloned().collect();
        languages.sort();
        languages
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        lock(&self.state).connections.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `workspace_id` active, disposing every connection.
    pub fn switch_workspace(&self, workspace_id: &str) {
        let stale: Vec<_> = {
            let mut state = lock(&self.state);
            state.workspace_id = workspace_id.to_string();
            state.connections.drain().map(|(_, c)| c).collect()
        };
        for old in stale {
            old.dispose();
        }
    }

    /// Dispose every connection and empty the registry.
    pub fn dispose_all(&self) {
        let stale: Vec<_> = lock(&self.state)
            .connections
            .drain()
            .map(|(_, c)| c)
            .collect();
        let count = stale.len();
        for old in stale {
            old.dispose();
        }
        if count > 0 {
            tracing::debug!(count, "disposed all connections");
        }
    }
}
