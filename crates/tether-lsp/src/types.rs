//! Protocol-side types for the subset of LSP the bridge speaks.
//!
//! Positions here are 0-based (`line`, `character`) as on the wire.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// LSP Position: 0-based line and character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LspPosition {
    /// Zero-based line number.
    pub line: u32,
    /// Zero-based character offset.
    pub character: u32,
}

impl LspPosition {
    /// Create a zero-based position.
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// LSP Range: start and end positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LspRange {
    pub start: LspPosition,
    pub end: LspPosition,
}

impl LspRange {
    /// Create a range from its endpoints.
    pub fn new(start: LspPosition, end: LspPosition) -> Self {
        Self { start, end }
    }
}

/// A location in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: LspRange,
}

/// `LocationLink`, which some servers return for definitions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationLink {
    pub target_uri: String,
    pub target_range: LspRange,
    pub target_selection_range: Option<LspRange>,
}

impl From<LocationLink> for Location {
    fn from(link: LocationLink) -> Self {
        Location {
            uri: link.target_uri,
            range: link.target_selection_range.unwrap_or(link.target_range),
        }
    }
}

/// A text edit in protocol coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: LspRange,
    pub new_text: String,
}

/// Diagnostic severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Map the wire value; anything outside 1..=4 is `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }
}

fn lenient_severity<'de, D>(deserializer: D) -> Result<Option<DiagnosticSeverity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_i64)
        .and_then(DiagnosticSeverity::from_code))
}

/// A diagnostic as pushed by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Diagnostic {
    pub range: LspRange,
    /// `None` when absent or outside the protocol's 1..=4.
    #[serde(default, deserialize_with = "lenient_severity")]
    pub severity: Option<DiagnosticSeverity>,
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    /// String or number on the wire.
    #[serde(default)]
    pub code: Option<Value>,
}

/// Params of `textDocument/publishDiagnostics`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub version: Option<i64>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PublishDiagnosticsParams {
    /// Parse notification params.
    ///
    /// Requires a string `uri`; a missing `diagnostics` array reads as empty
    /// and individual malformed entries are skipped.
    pub fn from_value(params: &Value) -> Option<Self> {
        let uri = params.get("uri")?.as_str()?.to_string();
        let diagnostics = params
            .get("diagnostics")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|d| serde_json::from_value(d.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            uri,
            version: params.get("version").and_then(Value::as_i64),
            diagnostics,
        })
    }
}

/// Completion documentation: a bare string or `MarkupContent`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Documentation {
    Plain(String),
    Markup {
        #[serde(default)]
        kind: Option<String>,
        value: String,
    },
}

impl Documentation {
    /// The documentation text, whichever shape it came in.
    pub fn into_text(self) -> String {
        match self {
            Documentation::Plain(text) => text,
            Documentation::Markup { value, .. } => value,
        }
    }
}

/// A completion item as the server sends it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    pub label: String,
    #[serde(default)]
    pub kind: Option<u32>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub insert_text: Option<String>,
    #[serde(default)]
    pub documentation: Option<Documentation>,
}

/// What the server said it can do in its `initialize` result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerCapabilities {
    pub completion: bool,
    pub definition: bool,
    pub rename: bool,
    pub formatting: bool,
}

fn provider_enabled(caps: &Value, key: &str) -> bool {
    match caps.get(key) {
        Some(Value::Bool(enabled)) => *enabled,
        Some(Value::Object(_)) => true,
        _ => false,
    }
}

impl ServerCapabilities {
    /// Read the capability flags from an `initialize` result's `capabilities`.
    pub fn from_value(caps: &Value) -> Self {
        Self {
            completion: caps.get("completionProvider").is_some_and(Value::is_object),
            definition: provider_enabled(caps, "definitionProvider"),
            rename: provider_enabled(caps, "renameProvider"),
            formatting: provider_enabled(caps, "documentFormattingProvider"),
        }
    }
}

/// Client capabilities sent with `initialize`.
pub fn client_capabilities() -> Value {
    serde_json::json!({
        "textDocument": {
            "synchronization": {
                "dynamicRegistration": false,
                "didSave": false,
                "willSave": false
            },
            "completion": {
                "dynamicRegistration": false,
                "completionItem": {
                    "snippetSupport": false,
                    "documentationFormat": ["markdown", "plaintext"]
                }
            },
            "definition": {
                "dynamicRegistration": false,
                "linkSupport": false
            },
            "rename": {
                "dynamicRegistration": false,
                "prepareSupport": false
            },
            "formatting": {
                "dynamicRegistration": false
            },
            "publishDiagnostics": {
                "relatedInformation": false
            }
        },
        "workspace": {
            "workspaceFolders": true,
            "configuration": false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn position_serializes_with_protocol_names() {
        let json = serde_json::to_string(&LspPosition::new(5, 10)).unwrap();
        assert_eq!(json, r#"{"line":5,"character":10}"#);
    }

    #[test]
    fn text_edit_uses_camel_case() {
        let edit: TextEdit = serde_json::from_value(json!({
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 3}},
            "newText": "abc"
        }))
        .unwrap();
        assert_eq!(edit.new_text, "abc");
        let back = serde_json::to_value(&edit).unwrap();
        assert_eq!(back["newText"], "abc");
    }

    #[test]
    fn severity_from_code_table() {
        assert_eq!(DiagnosticSeverity::from_code(1), Some(DiagnosticSeverity::Error));
        assert_eq!(DiagnosticSeverity::from_code(4), Some(DiagnosticSeverity::Hint));
        assert_eq!(DiagnosticSeverity::from_code(0), None);
        assert_eq!(DiagnosticSeverity::from_code(9), None);
    }

    #[test]
    fn diagnostic_tolerates_odd_severity_and_numeric_code() {
        let d: Diagnostic = serde_json::from_value(json!({
            "range": {"start": {"line": 1, "character": 2}, "end": {"line": 1, "character": 4}},
            "severity": 17,
            "code": 2304,
            "message": "cannot find name"
        }))
        .unwrap();
        assert_eq!(d.severity, None);
        assert_eq!(d.code, Some(json!(2304)));
        assert!(d.source.is_none());
    }

    #[test]
    fn publish_params_skip_malformed_entries() {
        let params = json!({
            "uri": "file:///workspaces/w/a.py",
            "version": 3,
            "diagnostics": [
                {"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}},
                 "severity": 1, "message": "bad"},
                {"message": "no range"}
            ]
        });
        let parsed = PublishDiagnosticsParams::from_value(&params).unwrap();
        assert_eq!(parsed.version, Some(3));
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].severity, Some(DiagnosticSeverity::Error));
    }

    #[test]
    fn publish_params_need_uri() {
        assert!(PublishDiagnosticsParams::from_value(&json!({"diagnostics": []})).is_none());
        let empty = PublishDiagnosticsParams::from_value(&json!({"uri": "file:///x"})).unwrap();
        assert!(empty.diagnostics.is_empty());
    }

    #[test]
    fn documentation_accepts_string_or_markup() {
        let plain: Documentation = serde_json::from_value(json!("docs")).unwrap();
        assert_eq!(plain.into_text(), "docs");
        let markup: Documentation =
            serde_json::from_value(json!({"kind": "markdown", "value": "**docs**"})).unwrap();
        assert_eq!(markup.into_text(), "**docs**");
    }

    #[test]
    fn location_link_prefers_selection_range() {
        let link: LocationLink = serde_json::from_value(json!({
            "targetUri": "file:///b.rs",
            "targetRange": {"start": {"line": 1, "character": 0}, "end": {"line": 9, "character": 1}},
            "targetSelectionRange": {"start": {"line": 1, "character": 3}, "end": {"line": 1, "character": 7}}
        }))
        .unwrap();
        let loc = Location::from(link);
        assert_eq!(loc.uri, "file:///b.rs");
        assert_eq!(loc.range.start, LspPosition::new(1, 3));
    }

    #[test]
    fn capabilities_from_server() {
        let caps = ServerCapabilities::from_value(&json!({
            "completionProvider": {"triggerCharacters": ["."]},
            "definitionProvider": true,
            "renameProvider": {"prepareProvider": true},
            "documentFormattingProvider": false
        }));
        assert!(caps.completion);
        assert!(caps.definition);
        assert!(caps.rename);
        assert!(!caps.formatting);
    }

    #[test]
    fn capabilities_from_empty_object() {
        assert_eq!(
            ServerCapabilities::from_value(&json!({})),
            ServerCapabilities::default()
        );
    }

    #[test]
    fn client_capabilities_cover_used_methods() {
        let caps = client_capabilities();
        let td = &caps["textDocument"];
        for key in ["completion", "definition", "rename", "formatting", "publishDiagnostics"] {
            assert!(td[key].is_object(), "missing {key}");
        }
    }
}
