//! tether-core: editor-side vocabulary shared by the tether crates.
//!
//! Positions here use the editor's 1-based line/column convention.
//! Conversion to protocol coordinates lives in `tether-lsp`.
pub mod edit;
pub mod error;
pub mod logging;
pub mod paths;
pub mod position;
pub mod uri;

pub use edit::{apply_edits, TextEdit};
pub use error::CoreError;
pub use paths::AppPaths;
pub use position::{EditorPosition, EditorRange};
