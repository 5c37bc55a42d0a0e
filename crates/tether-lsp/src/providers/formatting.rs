//! `textDocument/formatting`.
use serde_json::{json, Value};
use tether_core::TextEdit;

use super::editor_edits;

/// Indent width sent with every formatting request.
pub const TAB_SIZE: u32 = 2;
/// Indent with spaces, never tabs.
pub const INSERT_SPACES: bool = true;

/// `textDocument/formatting` params for `uri` with the fixed options.
pub fn params(uri: &str) -> Value {
    json!({
        "textDocument": { "uri": uri },
        "options": {
            "tabSize": TAB_SIZE,
            "insertSpaces": INSERT_SPACES
        }
    })
}

/// A result that is not an array means no edits.
pub fn parse_formatting(result: Value) -> Vec<TextEdit> {
    match result {
        Value::Array(raw) => editor_edits(&raw),
        _ => Vec::new(),
    }
}
