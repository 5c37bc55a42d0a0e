//! Change debouncer.
//!
//! Edits to a document inside the debounce window collapse into a single
//! `didChange` carrying the last text. Each document has at most one timer.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::documents::DocumentManager;
use crate::error::LspError;
use crate::lock;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

struct PendingEdit {
    ticket: u64,
    text: String,
    timer: JoinHandle<()>,
}

/// Send gate for one document.
type Gate = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
struct Queue {
    pending: Mutex<HashMap<String, PendingEdit>>,
    /// Held from taking a document's pending edit until its `didChange` is
    /// sent, so sends for one document go out in schedule order.
    gates: Mutex<HashMap<String, Gate>>,
}

impl Queue {
    fn gate(&self, uri: &str) -> Gate {
        Arc::clone(lock(&self.gates).entry(uri.to_string()).or_default())
    }

    fn forget(&self, uri: &str) -> Option<PendingEdit> {
        lock(&self.gates).remove(uri);
        lock(&self.pending).remove(uri)
    }
}

/// Collapses bursts of edits into one `didChange` per document.
pub struct ChangeDebouncer {
    documents: Arc<DocumentManager>,
    window: Duration,
    queue: Arc<Queue>,
    next_ticket: AtomicU64,
}

impl ChangeDebouncer {
    /// Create a debouncer sending through `documents` after `window` of quiet.
    pub fn new(documents: Arc<DocumentManager>, window: Duration) -> Self {
        Self {
            documents,
            window,
            queue: Arc::new(Queue::default()),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// The quiet period before a pending edit is sent.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `text` as the latest content of `uri` and (re)start its timer.
    pub fn schedule(&self, uri: &str, text: impl Into<String>) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut pending = lock(&self.queue.pending);
        let timer = tokio::spawn(fire_after(
            Arc::clone(&self.queue),
            Arc::clone(&self.documents),
            self.window,
            uri.to_string(),
            ticket,
        ));
        let edit = PendingEdit {
            ticket,
            text: text.into(),
            timer,
        };
        if let Some(previous) = pending.insert(uri.to_string(), edit) {
            previous.timer.abort();
        }
    }

    /// Send the pending edit for `uri` now.
    ///
    /// Waits for a send already under way for `uri` to finish first.
    /// Returns the version sent, `None` if nothing was pending or the
    /// document is not synced.
    pub async fn flush(&self, uri: &str) -> Result<Option<i64>, LspError> {
        let gate = self.queue.gate(uri);
        let _sending = gate.lock().await;
        let edit = lock(&self.queue.pending).remove(uri);
        let Some(edit) = edit else {
            return Ok(None);
        };
        edit.timer.abort();
        tracing::trace!(%uri, "flushing debounced change");
        self.documents.change(uri, &edit.text).await
    }

    /// Send every pending edit now.
    pub async fn flush_all(&self) -> Result<(), LspError> {
        let uris: Vec<String> = lock(&self.queue.pending).keys().cloned().collect();
        for uri in uris {
            self.flush(&uri).await?;
        }
        Ok(())
    }

    /// Drop the pending edit for `uri`. Returns whether there was one.
    pub fn cancel(&self, uri: &str) -> bool {
        match self.queue.forget(uri) {
            Some(edit) => {
                edit.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Drop every pending edit.
    pub fn cancel_all(&self) {
        lock(&self.queue.gates).clear();
        for (_, edit) in lock(&self.queue.pending).drain() {
            edit.timer.abort();
        }
    }

    /// Number of documents with an edit waiting.
    pub fn pending_count(&self) -> usize {
        lock(&self.queue.pending).len()
    }

    /// Whether `uri` has an edit waiting.
    pub fn is_pending(&self, uri: &str) -> bool {
        lock(&self.queue.pending).contains_key(uri)
    }
}

impl Drop for ChangeDebouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn fire_after(
    queue: Arc<Queue>,
    documents: Arc<DocumentManager>,
    window: Duration,
    uri: String,
    ticket: u64,
) {
    tokio::time::sleep(window).await;
    let gate = queue.gate(&uri);
    let _sending = gate.lock().await;
    let text = {
        let mut pending = lock(&queue.pending);
        match pending.get(&uri) {
            Some(edit) if edit.ticket == ticket => pending.remove(&uri).map(|edit| edit.text),
            _ => None,
        }
    };
    let Some(text) = text else {
        return;
    };
    tracing::trace!(%uri, "debounce window elapsed");
    match documents.change(&uri, &text).await {
        Ok(Some(version)) => tracing::trace!(%uri, version, "change sent"),
        Ok(None) => {}
        Err(e) => tracing::warn!(%uri, error = %e, "debounced change failed"),
    }
}
