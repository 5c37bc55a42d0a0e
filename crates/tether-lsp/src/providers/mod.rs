//! Provider adapters: editor-shaped requests in, editor-shaped results out.
//!
//! Each capability translates editor coordinates to protocol coordinates,
//! sends one request on the document's connection and translates the reply
//! back. A document whose language has no connection gets the empty result.
use std::sync::Arc;

use serde_json::{json, Value};
use tether_core::{EditorPosition, TextEdit};

use crate::connection::Connection;
use crate::error::LspError;
use crate::position::to_protocol;
use crate::registry::ConnectionRegistry;

pub mod completion;
pub mod definition;
pub mod formatting;
pub mod rename;

pub use completion::Suggestion;
pub use definition::EditorLocation;
pub use rename::RenameResult;

/// The document a capability request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub uri: String,
    pub language_id: String,
}

impl DocumentRef {
    /// Reference a document by URI and language id.
    pub fn new(uri: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            language_id: language_id.into(),
        }
    }
}

/// Capability entry points over a registry.
#[derive(Clone)]
pub struct Providers {
    registry: Arc<ConnectionRegistry>,
}

impl Providers {
    /// Providers resolving connections through `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The open connection for `doc`, or `None` when its language has none.
    async fn connection(&self, doc: &DocumentRef) -> Result<Option<Arc<Connection>>, LspError> {
        let Some(connection) = self.registry.get(&doc.language_id) else {
            tracing::trace!(uri = %doc.uri, language = %doc.language_id, "no connection for document");
            return Ok(None);
        };
        connection.open().await?;
        Ok(Some(connection))
    }

    /// Completion suggestions at `at`, empty when no server handles the language.
    pub async fn completion(
        &self,
        doc: &DocumentRef,
        at: EditorPosition,
    ) -> Result<Vec<Suggestion>, LspError> {
        let params = position_params(doc, at)?;
        let Some(connection) = self.connection(doc).await? else {
            return Ok(Vec::new());
        };
        let result = connection.request("textDocument/completion", params).await?;
        Ok(completion::parse_completion(result, at))
    }

    /// Definition sites for the symbol at `at`, in editor coordinates.
    pub async fn definition(
        &self,
        doc: &DocumentRef,
        at: EditorPosition,
    ) -> Result<Vec<EditorLocation>, LspError> {
        let params = position_params(doc, at)?;
        let Some(connection) = self.connection(doc).await? else {
            return Ok(Vec::new());
        };
        let result = connection.request("textDocument/definition", params).await?;
        Ok(definition::parse_definition(result))
    }

    /// `None` when there is no server or it proposes no changes.
    pub async fn rename(
        &self,
        doc: &DocumentRef,
        at: EditorPosition,
        new_name: &str,
    ) -> Result<Option<RenameResult>, LspError> {
        let mut params = position_params(doc, at)?;
        params["newName"] = json!(new_name);
        let Some(connection) = self.connection(doc).await? else {
            return Ok(None);
        };
        let result = connection.request("textDocument/rename", params).await?;
        Ok(rename::parse_rename(result))
    }

    /// Whole-document formatting edits, back to front.
    pub async fn formatting(&self, doc: &DocumentRef) -> Result<Vec<TextEdit>, LspError> {
        let Some(connection) = self.connection(doc).await? else {
            return Ok(Vec::new());
        };
        let result = connection
            .request("textDocument/formatting", formatting::params(&doc.uri))
            .await?;
        Ok(formatting::parse_formatting(result))
    }
}

fn position_params(doc: &DocumentRef, at: EditorPosition) -> Result<Value, LspError> {
    let position = to_protocol(at)?;
    Ok(json!({
        "textDocument": { "uri": doc.uri },
        "position": position
    }))
}

/// Parse protocol edits into editor edits, skipping malformed entries.
fn editor_edits(raw: &[Value]) -> Vec<TextEdit> {
    let mut edits: Vec<TextEdit> = raw
        .iter()
        .filter_map(|value| serde_json::from_value::<crate::types::TextEdit>(value.clone()).ok())
        .map(|edit| TextEdit::new(crate::position::range_to_editor(edit.range), edit.new_text))
        .collect();
    tether_core::edit::sort_back_to_front(&mut edits);
    edits
}
