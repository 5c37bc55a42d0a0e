//! Bridge error types.
use std::time::Duration;

/// Errors from language-server bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    /// The transport for a server could not be established.
    #[error("server failed to start: {0}")]
    SpawnFailed(String),

    /// The initialize/initialized exchange did not complete.
    #[error("server initialization failed: {0}")]
    HandshakeFailed(String),

    /// JSON-RPC error returned by the server.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// The error code (0 when the server sent none).
        code: i64,
        /// The error message.
        message: String,
    },

    /// No reply arrived within the configured deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was disposed or its transport dropped.
    #[error("connection closed")]
    ConnectionClosed,

    /// No transport is open; call `open()` first.
    #[error("connection is not open")]
    NotConnected,

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An inbound payload is not a usable JSON-RPC message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Editor coordinates must be at least 1 on both axes.
    #[error("invalid editor position {line}:{column}")]
    InvalidPosition {
        /// Editor line as given.
        line: u32,
        /// Editor column as given.
        column: u32,
    },

    /// A change arrived for a document that was never opened.
    #[error("document not open: {0}")]
    DocumentNotOpen(String),

    /// Server not found for a language.
    #[error("no server registered for language: {0}")]
    NoServer(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LspError {
    fn from(err: serde_json::Error) -> Self {
        LspError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rpc_display() {
        let err = LspError::Rpc {
            code: -32601,
            message: "method not found".into(),
        };
        assert_eq!(err.to_string(), "JSON-RPC error -32601: method not found");
    }

    #[test]
    fn error_timeout_display() {
        let err = LspError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "request timed out after 5s");
    }

    #[test]
    fn error_closed_display() {
        assert_eq!(LspError::ConnectionClosed.to_string(), "connection closed");
    }

    #[test]
    fn error_invalid_position_display() {
        let err = LspError::InvalidPosition { line: 0, column: 4 };
        assert_eq!(err.to_string(), "invalid editor position 0:4");
    }

    #[test]
    fn error_no_server_display() {
        let err = LspError::NoServer("plaintext".into());
        assert_eq!(
            err.to_string(),
            "no server registered for language: plaintext"
        );
    }

    #[test]
    fn error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken");
        assert!(LspError::from(io).to_string().contains("broken"));
    }

    #[test]
    fn error_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(LspError::from(err), LspError::Serialization(_)));
    }
}
