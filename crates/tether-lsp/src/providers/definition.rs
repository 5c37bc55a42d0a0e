//! `textDocument/definition`.
use serde_json::Value;
use tether_core::EditorRange;

use crate::position::range_to_editor;
use crate::types::{Location, LocationLink};

/// A definition site in editor coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorLocation {
    pub uri: String,
    pub range: EditorRange,
}

impl From<Location> for EditorLocation {
    fn from(location: Location) -> Self {
        EditorLocation {
            uri: location.uri,
            range: range_to_editor(location.range),
        }
    }
}

fn location(value: Value) -> Option<Location> {
    if value.get("targetUri").is_some() {
        serde_json::from_value::<LocationLink>(value)
            .ok()
            .map(Location::from)
    } else {
        serde_json::from_value::<Location>(value).ok()
    }
}

/// Normalize `null`, a single location or an array of locations.
///
/// `LocationLink`s are accepted too and reported at their selection range.
pub fn parse_definition(result: Value) -> Vec<EditorLocation> {
    match result {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(location)
            .map(EditorLocation::from)
            .collect(),
        single => location(single)
            .map(EditorLocation::from)
            .into_iter()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::EditorPosition;

    fn loc(uri: &str, line: u32) -> Value {
        json!({
            "uri": uri,
            "range": {"start": {"line": line, "character": 4}, "end": {"line": line, "character": 10}}
        })
    }

    #[test]
    fn null_is_empty() {
        assert!(parse_definition(Value::Null).is_empty());
    }

    #[test]
    fn single_location() {
        let found = parse_definition(loc("file:///workspaces/w/lib.py", 9));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uri, "file:///workspaces/w/lib.py");
        assert_eq!(found[0].range.start, EditorPosition::new(10, 5));
        assert_eq!(found[0].range.end, EditorPosition::new(10, 11));
    }

    #[test]
    fn array_of_locations() {
        let found = parse_definition(json!([loc("file:///a.py", 0), loc("file:///b.py", 1)]));
        let uris: Vec<&str> = found.iter().map(|l| l.uri.as_str()).collect();
        assert_eq!(uris, vec!["file:///a.py", "file:///b.py"]);
    }

    #[test]
    fn location_links() {
        let found = parse_definition(json!([{
            "targetUri": "file:///c.py",
            "targetRange": {"start": {"line": 2, "character": 0}, "end": {"line": 6, "character": 0}},
            "targetSelectionRange": {"start": {"line": 2, "character": 4}, "end": {"line": 2, "character": 8}}
        }]));
        assert_eq!(found[0].uri, "file:///c.py");
        assert_eq!(found[0].range.start, EditorPosition::new(3, 5));
    }

    #[test]
    fn junk_is_skipped() {
        assert!(parse_definition(json!("nope")).is_empty());
        assert_eq!(parse_definition(json!([{"uri": 1}, loc("file:///a.py", 0)])).len(), 1);
    }
}
