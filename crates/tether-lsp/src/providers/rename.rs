//! `textDocument/rename`.
use std::collections::BTreeMap;

use serde_json::Value;
use tether_core::{apply_edits, CoreError, TextEdit};

use super::editor_edits;

/// Edits a rename would make, per document URI.
///
/// Every edit the server proposed is kept, ordered from the end of the
/// document backward so the list can be applied in sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenameResult {
    pub changes: BTreeMap<String, Vec<TextEdit>>,
}

impl RenameResult {
    /// Edits for `uri`, back to front. Empty when the server listed none.
    pub fn edits(&self, uri: &str) -> &[TextEdit] {
        self.changes.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of edits across every document.
    pub fn edit_count(&self) -> usize {
        self.changes.values().map(Vec::len).sum()
    }

    /// Apply the edits for `uri` to `text`.
    ///
    /// Returns `None` when the rename does not touch `uri`.
    pub fn apply_to(&self, uri: &str, text: &str) -> Result<Option<String>, CoreError> {
        match self.changes.get(uri) {
            Some(edits) => apply_edits(text, edits).map(Some),
            None => Ok(None),
        }
    }
}

/// Parse a `WorkspaceEdit`.
///
/// Both `changes` and `documentChanges` are understood. `None` means the
/// server signalled nothing to change; URIs listed with no edits are kept
/// with an empty list.
pub fn parse_rename(result: Value) -> Option<RenameResult> {
    let mut changes: BTreeMap<String, Vec<TextEdit>> = BTreeMap::new();

    if let Some(map) = result.get("changes").and_then(Value::as_object) {
        for (uri, edits) in map {
            let edits = edits.as_array().map(|raw| editor_edits(raw)).unwrap_or_default();
            changes.entry(uri.clone()).or_default().extend(edits);
        }
    }

    if let Some(document_changes) = result.get("documentChanges").and_then(Value::as_array) {
        for change in document_changes {
            // create/rename/delete file operations carry a `kind`.
            if change.get("kind").is_some() {
                continue;
            }
            let Some(uri) = change
                .get("textDocument")
                .and_then(|doc| doc.get("uri"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let edits = change
                .get("edits")
                .and_then(Value::as_array)
                .map(|raw| editor_edits(raw))
                .unwrap_or_default();
            changes.entry(uri.to_string()).or_default().extend(edits);
        }
    }

    if changes.is_empty() {
        return None;
    }
    for edits in changes.values_mut() {
        tether_core::edit::sort_back_to_front(edits);
    }
    Some(RenameResult { changes })
}
