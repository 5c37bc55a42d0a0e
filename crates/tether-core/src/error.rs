use thiserror::Error;

use crate::position::EditorPosition;

/// Errors raised by editor-side helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Editor coordinates start at 1 on both axes.
    #[error("invalid editor position {0}: line and column start at 1")]
    InvalidPosition(EditorPosition),

    #[error("position {0} is outside the document")]
    OutOfBounds(EditorPosition),

    /// Two edits in one batch touch the same span.
    #[error("edits overlap at {0}")]
    OverlappingEdits(EditorPosition),

    #[error("could not determine home directory")]
    NoHomeDir,
}
