//! Applying editor-coordinate text edits to a document.
//!
//! Edits in a batch all refer to the original text. They are applied from
//! the end of the document backward so earlier offsets stay valid.
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::position::{EditorPosition, EditorRange};

/// A replacement of `range` by `new_text`, in editor coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: EditorRange,
    pub new_text: String,
}

impl TextEdit {
    /// Replace `range` with `new_text`.
    pub fn new(range: EditorRange, new_text: impl Into<String>) -> Self {
        Self {
            range,
            new_text: new_text.into(),
        }
    }
}

/// Sort edits so the one starting furthest into the document comes first.
///
/// Edits with equal starts keep their relative order.
pub fn sort_back_to_front(edits: &mut [TextEdit]) {
    edits.sort_by(|a, b| b.range.start.cmp(&a.range.start));
}

/// Apply `edits` to `text` and return the new text.
///
/// Columns count UTF-16 code units, as language servers do, so a character
/// outside the Basic Multilingual Plane spans two columns. A column one past
/// the last unit of a line addresses the line end; a column that splits a
/// surrogate pair is out of bounds.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> Result<String, CoreError> {
    let line_starts = line_starts(text);

    let mut spans = Vec::with_capacity(edits.len());
    for edit in edits {
        let start = byte_offset(text, &line_starts, edit.range.start)?;
        let end = byte_offset(text, &line_starts, edit.range.end)?;
        if end < start {
            return Err(CoreError::OutOfBounds(edit.range.end));
        }
        spans.push((start, end, edit));
    }
    spans.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = text.to_string();
    let mut floor = usize::MAX;
    for (start, end, edit) in spans {
        if end > floor {
            return Err(CoreError::OverlappingEdits(edit.range.end));
        }
        out.replace_range(start..end, &edit.new_text);
        floor = start;
    }
    Ok(out)
}

fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

fn byte_offset(text: &str, line_starts: &[usize], pos: EditorPosition) -> Result<usize, CoreError> {
    if !pos.is_valid() {
        return Err(CoreError::InvalidPosition(pos));
    }
    let line_idx = (pos.line - 1) as usize;
    let start = *line_starts
        .get(line_idx)
        .ok_or(CoreError::OutOfBounds(pos))?;
    let end = line_starts
        .get(line_idx + 1)
        .map(|next| next - 1)
        .unwrap_or(text.len());
    let line = &text[start..end];

    let col = (pos.column - 1) as usize;
    let mut units = 0;
    for (i, ch) in line.char_indices() {
        if units == col {
            return Ok(start + i);
        }
        units += ch.len_utf16();
        if units > col {
            return Err(CoreError::OutOfBounds(pos));
        }
    }
    if units == col {
        Ok(end)
    } else {
        Err(CoreError::OutOfBounds(pos))
    }
}
