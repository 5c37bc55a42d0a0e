//! tether-lsp: the language-server bridge.
//!
//! Multiplexes one JSON-RPC connection per language for the active
//! workspace, translates between editor (1-based) and protocol (0-based)
//! coordinates, and routes pushed diagnostics back to the editor.
use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod bridge;
pub mod codec;
pub mod connection;
pub mod debounce;
pub mod diagnostics;
pub mod dispatcher;
pub mod documents;
pub mod error;
pub mod position;
pub mod providers;
pub mod registry;
pub mod transport;
pub mod types;

pub use bridge::{Bridge, BridgeSettings};
pub use connection::{Connection, ConnectionState, DocumentSession};
pub use debounce::ChangeDebouncer;
pub use diagnostics::{DiagnosticsRouter, Marker, MarkerSeverity, MarkerUpdate};
pub use documents::DocumentManager;
pub use error::LspError;
pub use providers::{DocumentRef, EditorLocation, Providers, RenameResult, Suggestion};
pub use registry::{ConnectionRegistry, RegistryOptions};
pub use transport::{
    ConnectParams, Connector, Duplex, MemoryConnector, ServerEnd, StdioConnector,
};
pub use types::{LspPosition, LspRange, ServerCapabilities};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
