use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading, parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to create default config: {0}")]
    CreateDefault(String),

    #[error("TOML parse error: {0}")]
    Parse(String),

    /// A value is syntactically fine but outside its allowed range.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// Dotted path of the offending key, e.g. `lsp.debounce_ms`.
        field: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
