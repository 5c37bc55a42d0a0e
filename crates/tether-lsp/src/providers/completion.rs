//! `textDocument/completion`.
use serde_json::Value;
use tether_core::{EditorPosition, EditorRange};

use crate::types::CompletionItem;

/// A completion suggestion in editor terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub label: String,
    /// Text inserted on accept; the label when the server sent none.
    pub insert_text: String,
    pub documentation: Option<String>,
    pub detail: Option<String>,
    /// Protocol `CompletionItemKind`.
    pub kind: Option<u32>,
    /// Always collapsed at the cursor: suggestions insert, never replace.
    pub range: EditorRange,
}

impl Suggestion {
    fn from_item(item: CompletionItem, at: EditorPosition) -> Self {
        Suggestion {
            insert_text: item.insert_text.unwrap_or_else(|| item.label.clone()),
            label: item.label,
            documentation: item.documentation.map(|d| d.into_text()),
            detail: item.detail,
            kind: item.kind,
            range: EditorRange::collapsed(at),
        }
    }
}

/// Normalize a completion result (array or `{items}`) into suggestions.
///
/// Any other shape yields no suggestions. Items that do not parse are
/// skipped.
pub fn parse_completion(result: Value, at: EditorPosition) -> Vec<Suggestion> {
    let items = match result {
        Value::Array(items) => items,
        Value::Object(mut list) => match list.remove("items") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<CompletionItem>(item).ok())
        .map(|item| Suggestion::from_item(item, at))
        .collect()
}
