use std::fmt;

/// A 1-based line/column position as the editor surface reports it.
///
/// Nothing stops a caller from building `EditorPosition::new(0, 0)`; the
/// translator in `tether-lsp` rejects such values when converting.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    serde::Serialize,
    serde::Deserialize,
    Hash,
)]
pub struct EditorPosition {
    pub line: u32,
    pub column: u32,
}

impl EditorPosition {
    /// Create a position. Validity is checked by [`EditorPosition::is_valid`].
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// `true` when both axes satisfy the editor's 1-based contract.
    pub fn is_valid(&self) -> bool {
        self.line >= 1 && self.column >= 1
    }
}

impl fmt::Display for EditorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span between two editor positions.
///
/// Unlike a selection, the endpoints are kept exactly as given: ranges
/// coming back from a language server are not reordered or clamped.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    serde::Serialize,
    serde::Deserialize,
    Hash,
)]
pub struct EditorRange {
    pub start: EditorPosition,
    pub end: EditorPosition,
}

impl EditorRange {
    /// Create a range from its endpoints.
    pub fn new(start: EditorPosition, end: EditorPosition) -> Self {
        Self { start, end }
    }

    /// A zero-width range at `pos` (insertion point).
    pub fn collapsed(pos: EditorPosition) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Whether the range covers no text.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for EditorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_new_sets_fields() {
        let p = EditorPosition::new(3, 7);
        assert_eq!(p.line, 3);
        assert_eq!(p.column, 7);
    }

    #[test]
    fn position_validity() {
        assert!(EditorPosition::new(1, 1).is_valid());
        assert!(!EditorPosition::new(0, 1).is_valid());
        assert!(!EditorPosition::new(1, 0).is_valid());
        assert!(!EditorPosition::default().is_valid());
    }

    #[test]
    fn position_ordering_is_line_major() {
        assert!(EditorPosition::new(1, 50) < EditorPosition::new(2, 1));
        assert!(EditorPosition::new(2, 3) < EditorPosition::new(2, 4));
    }

    #[test]
    fn position_display() {
        assert_eq!(EditorPosition::new(4, 9).to_string(), "4:9");
    }

    #[test]
    fn range_keeps_endpoints_as_given() {
        let r = EditorRange::new(EditorPosition::new(5, 1), EditorPosition::new(2, 1));
        assert_eq!(r.start.line, 5);
        assert_eq!(r.end.line, 2);
    }

    #[test]
    fn collapsed_range_is_empty() {
        let r = EditorRange::collapsed(EditorPosition::new(2, 2));
        assert!(r.is_empty());
        assert_eq!(r.to_string(), "2:2-2:2");
    }
}
