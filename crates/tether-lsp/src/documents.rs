//! Document sessions: which open document goes to which connection.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::diagnostics::DiagnosticsRouter;
use crate::error::LspError;
use crate::lock;
use crate::registry::ConnectionRegistry;

/// Opens, changes and closes documents on the connection for their language.
pub struct DocumentManager {
    registry: Arc<ConnectionRegistry>,
    router: Option<Arc<DiagnosticsRouter>>,
    /// URI → language id of every open document.
    languages: Mutex<HashMap<String, String>>,
}

impl DocumentManager {
    /// A manager opening documents through `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            router: None,
            languages: Mutex::new(HashMap::new()),
        }
    }

    /// Track open documents in `router` so their diagnostics are accepted.
    pub fn with_router(mut self, router: Arc<DiagnosticsRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// The registry connections come from.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Open `uri` with version 1, handshaking with the server first if needed.
    ///
    /// Languages without a server are accepted and ignored.
    pub async fn open(&self, uri: &str, language_id: &str, text: &str) -> Result<(), LspError> {
        if !self.registry.supports(language_id) {
            tracing::debug!(%uri, language = %language_id, "no language server, document not synced");
            return Ok(());
        }
        let workspace_id = self.registry.workspace_id();
        let connection = self.registry.ensure(&workspace_id, language_id);
        if let Some(router) = &self.router {
            router.track(uri);
        }

        if let Err(e) = connection.did_open(uri, language_id, text).await {
            if let Some(router) = &self.router {
                router.untrack(uri);
            }
            return Err(e);
        }
        lock(&self.languages).insert(uri.to_string(), language_id.to_string());
        Ok(())
    }

    /// Send the full new text of `uri`.
    ///
    /// Returns the version sent, or `None` when the document is not synced
    /// with any server.
    pub async fn change(&self, uri: &str, text: &str) -> Result<Option<i64>, LspError> {
        let Some(language_id) = self.language_of(uri) else {
            return Ok(None);
        };
        let Some(connection) = self.registry.get(&language_id) else {
            return Ok(None);
        };
        connection.did_change(uri, text).await.map(Some)
    }

    /// Close `uri` on its server and clear its diagnostics.
    pub async fn close(&self, uri: &str) {
        let language_id = lock(&self.languages).remove(uri);
        if let Some(connection) = language_id.and_then(|lang| self.registry.get(&lang)) {
            connection.did_close(uri).await;
        }
        if let Some(router) = &self.router {
            router.untrack(uri);
        }
    }

    /// Language `uri` was opened with, if it is synced.
    pub fn language_of(&self, uri: &str) -> Option<String> {
        lock(&self.languages).get(uri).cloned()
    }

    /// Whether `uri` is synced with a server.
    pub fn is_open(&self, uri: &str) -> bool {
        lock(&self.languages).contains_key(uri)
    }

    /// URIs of every synced document, sorted.
    pub fn open_documents(&self) -> Vec<String> {
        let mut uris: Vec<String> = lock(&self.languages).keys().cloned().collect();
        uris.sort();
        uris
    }

    /// Forget every document without notifying servers.
    pub fn forget_all(&self) {
        lock(&self.languages).clear();
    }
}
