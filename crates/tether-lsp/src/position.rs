//! Translation between editor coordinates (1-based line/column) and
//! protocol coordinates (0-based line/character).
//!
//! Ranges translate endpoint by endpoint. Nothing is clamped against the
//! document; keeping ranges inside it is the server's job.
use tether_core::{EditorPosition, EditorRange};

use crate::error::LspError;
use crate::types::{LspPosition, LspRange};

impl TryFrom<EditorPosition> for LspPosition {
    type Error = LspError;

    fn try_from(pos: EditorPosition) -> Result<Self, Self::Error> {
        if !pos.is_valid() {
            return Err(LspError::InvalidPosition {
                line: pos.line,
                column: pos.column,
            });
        }
        Ok(LspPosition::new(pos.line - 1, pos.column - 1))
    }
}

impl From<LspPosition> for EditorPosition {
    fn from(pos: LspPosition) -> Self {
        EditorPosition::new(pos.line.saturating_add(1), pos.character.saturating_add(1))
    }
}

/// Editor position → protocol position. Fails on a 0 line or column.
pub fn to_protocol(pos: EditorPosition) -> Result<LspPosition, LspError> {
    LspPosition::try_from(pos)
}

/// Protocol position → editor position.
pub fn to_editor(pos: LspPosition) -> EditorPosition {
    EditorPosition::from(pos)
}

/// Translate both endpoints of an editor range.
pub fn range_to_protocol(range: EditorRange) -> Result<LspRange, LspError> {
    Ok(LspRange::new(to_protocol(range.start)?, to_protocol(range.end)?))
}

/// Translate both endpoints of a protocol range.
pub fn range_to_editor(range: LspRange) -> EditorRange {
    EditorRange::new(to_editor(range.start), to_editor(range.end))
}
