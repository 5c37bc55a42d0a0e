//! The editor-facing facade.
//!
//! Wires one registry, document manager, debouncer, provider set and
//! diagnostics router together for the active workspace.
use std::sync::Arc;
use std::time::Duration;

use tether_core::uri::{document_uri, DEFAULT_WORKSPACE_ROOT};
use tether_core::{EditorPosition, TextEdit};

use crate::debounce::{ChangeDebouncer, DEFAULT_DEBOUNCE};
use crate::diagnostics::{DiagnosticsRouter, MarkerUpdate};
use crate::documents::DocumentManager;
use crate::error::LspError;
use crate::providers::{DocumentRef, EditorLocation, Providers, RenameResult, Suggestion};
use crate::registry::{ConnectionRegistry, RegistryOptions};
use crate::transport::Connector;
use crate::types::ServerCapabilities;

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub debounce: Duration,
    /// `None` disables the per-request deadline.
    pub request_timeout: Option<Duration>,
    pub workspace_root: String,
    pub token: Option<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            request_timeout: Some(Duration::from_secs(30)),
            workspace_root: DEFAULT_WORKSPACE_ROOT.to_string(),
            token: None,
        }
    }
}

/// Editor-facing entry point: documents, capabilities and diagnostics for
/// one workspace.
pub struct Bridge {
    registry: Arc<ConnectionRegistry>,
    documents: Arc<DocumentManager>,
    debouncer: ChangeDebouncer,
    providers: Providers,
    router: Arc<DiagnosticsRouter>,
}

impl Bridge {
    /// Wire a bridge for `workspace_id`. No server starts until a document opens.
    pub fn new(
        workspace_id: impl Into<String>,
        connector: Arc<dyn Connector>,
        settings: BridgeSettings,
    ) -> Self {
        let router = Arc::new(DiagnosticsRouter::new());
        let options = RegistryOptions {
            workspace_root: settings.workspace_root,
            request_timeout: settings.request_timeout,
            token: settings.token,
        };
        let registry = Arc::new(
            ConnectionRegistry::new(workspace_id, connector, options).with_router(Arc::clone(&router)),
        );
        let documents =
            Arc::new(DocumentManager::new(Arc::clone(&registry)).with_router(Arc::clone(&router)));
        Self {
            debouncer: ChangeDebouncer::new(Arc::clone(&documents), settings.debounce),
            providers: Providers::new(Arc::clone(&registry)),
            registry,
            documents,
            router,
        }
    }

    /// The active workspace.
    pub fn workspace_id(&self) -> String {
        self.registry.workspace_id()
    }

    /// `file://` URI of a path relative to the active workspace.
    pub fn document_uri(&self, relative_path: &str) -> String {
        document_uri(
            &self.registry.options().workspace_root,
            &self.registry.workspace_id(),
            relative_path,
        )
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The document session manager.
    pub fn documents(&self) -> &Arc<DocumentManager> {
        &self.documents
    }

    /// The change debouncer.
    pub fn debouncer(&self) -> &ChangeDebouncer {
        &self.debouncer
    }

    /// The diagnostics router.
    pub fn diagnostics(&self) -> &Arc<DiagnosticsRouter> {
        &self.router
    }

    /// Drop everything belonging to the current workspace and make
    /// `workspace_id` active.
    pub fn switch_workspace(&self, workspace_id: &str) {
        tracing::info!(workspace = %workspace_id, "switching workspace");
        self.debouncer.cancel_all();
        self.registry.switch_workspace(workspace_id);
        self.documents.forget_all();
        self.router.clear_all();
    }

    /// Open `uri` on the server for `language_id`, starting it if needed.
    pub async fn open_document(
        &self,
        uri: &str,
        language_id: &str,
        text: &str,
    ) -> Result<(), LspError> {
        self.documents.open(uri, language_id, text).await
    }

    /// Record an edit; the server hears about it after the debounce window.
    pub fn edit_document(&self, uri: &str, text: impl Into<String>) {
        self.debouncer.schedule(uri, text);
    }

    /// Send a pending edit for `uri` immediately.
    pub async fn flush(&self, uri: &str) -> Result<Option<i64>, LspError> {
        self.debouncer.flush(uri).await
    }

    /// Drop any pending edit, close `uri` on its server and clear its markers.
    pub async fn close_document(&self, uri: &str) {
        self.debouncer.cancel(uri);
        self.documents.close(uri).await;
    }

    fn document_ref(&self, uri: &str) -> Option<DocumentRef> {
        self.documents
            .language_of(uri)
            .map(|language_id| DocumentRef::new(uri, language_id))
    }

    /// Suggestions at `at`. Failures are logged and read as no suggestions.
    pub async fn completion(&self, uri: &str, at: EditorPosition) -> Vec<Suggestion> {
        let Some(doc) = self.document_ref(uri) else {
            return Vec::new();
        };
        self.providers
            .completion(&doc, at)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(%uri, error = %e, "completion failed");
                Vec::new()
            })
    }

    /// Definition sites for the symbol at `at`. Failures read as none.
    pub async fn definition(&self, uri: &str, at: EditorPosition) -> Vec<EditorLocation> {
        let Some(doc) = self.document_ref(uri) else {
            return Vec::new();
        };
        self.providers
            .definition(&doc, at)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(%uri, error = %e, "definition failed");
                Vec::new()
            })
    }

    /// Edits renaming the symbol at `at` to `new_name`. Errors propagate.
    pub async fn rename(
        &self,
        uri: &str,
        at: EditorPosition,
        new_name: &str,
    ) -> Result<Option<RenameResult>, LspError> {
        match self.document_ref(uri) {
            Some(doc) => self.providers.rename(&doc, at, new_name).await,
            None => Ok(None),
        }
    }

    /// Formatting edits for `uri`, back to front. Errors propagate.
    pub async fn format(&self, uri: &str) -> Result<Vec<TextEdit>, LspError> {
        match self.document_ref(uri) {
            Some(doc) => self.providers.formatting(&doc).await,
            None => Ok(Vec::new()),
        }
    }

    /// Add a sink for marker updates.
    pub fn on_markers<F>(&self, sink: F)
    where
        F: Fn(&MarkerUpdate) + Send + Sync + 'static,
    {
        self.router.on_markers(sink);
    }

    /// Add a sink for flattened problem lines.
    pub fn on_problems<F>(&self, sink: F)
    where
        F: Fn(&str, &[String]) + Send + Sync + 'static,
    {
        self.router.on_problems(sink);
    }

    /// Capabilities of the language's server, once it has handshaken.
    pub fn capabilities(&self, language_id: &str) -> Option<ServerCapabilities> {
        self.registry
            .get(language_id)
            .filter(|connection| connection.is_ready())
            .map(|connection| connection.capabilities())
    }

    /// Tear down every connection and forget all documents.
    pub fn shutdown(&self) {
        self.debouncer.cancel_all();
        self.registry.dispose_all();
        self.documents.forget_all();
        self.router.clear_all();
    }
}
