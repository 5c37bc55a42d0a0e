//! Diagnostics router.
//!
//! Takes `publishDiagnostics` pushes, translates them into editor markers
//! and forwards them to the editor's marker layer and to any problem-list
//! consumer. The latest push for a document replaces the previous one.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use tether_core::EditorRange;

use crate::lock;
use crate::position::range_to_editor;
use crate::types::{Diagnostic, DiagnosticSeverity, PublishDiagnosticsParams};

/// Severity scale of the editor's marker layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerSeverity {
    Error,
    Warning,
    Info,
    Hint,
}

impl From<Option<DiagnosticSeverity>> for MarkerSeverity {
    /// Missing or unknown severities are shown as warnings.
    fn from(severity: Option<DiagnosticSeverity>) -> Self {
        match severity {
            Some(DiagnosticSeverity::Error) => MarkerSeverity::Error,
            Some(DiagnosticSeverity::Warning) | None => MarkerSeverity::Warning,
            Some(DiagnosticSeverity::Information) => MarkerSeverity::Info,
            Some(DiagnosticSeverity::Hint) => MarkerSeverity::Hint,
        }
    }
}

impl fmt::Display for MarkerSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkerSeverity::Error => "error",
            MarkerSeverity::Warning => "warning",
            MarkerSeverity::Info => "info",
            MarkerSeverity::Hint => "hint",
        };
        f.write_str(name)
    }
}

/// A diagnostic in editor coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub range: EditorRange,
    pub message: String,
    pub severity: MarkerSeverity,
    pub source: Option<String>,
}

impl Marker {
    /// One problem-list line: `"{line}:{col} {message}"`.
    pub fn problem_line(&self) -> String {
        format!(
            "{}:{} {}",
            self.range.start.line, self.range.start.column, self.message
        )
    }
}

impl From<Diagnostic> for Marker {
    fn from(diagnostic: Diagnostic) -> Self {
        Marker {
            range: range_to_editor(diagnostic.range),
            message: diagnostic.message,
            severity: diagnostic.severity.into(),
            source: diagnostic.source,
        }
    }
}

/// The full marker set for one document, as handed to marker sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerUpdate {
    pub uri: String,
    /// Per-language owner tag, e.g. `lsp:python`.
    pub source_tag: String,
    /// Empty means "clear".
    pub markers: Vec<Marker>,
}

impl MarkerUpdate {
    /// `"{line}:{col} {message}"` for every marker.
    pub fn problems(&self) -> Vec<String> {
        self.markers.iter().map(Marker::problem_line).collect()
    }
}

/// Marker-layer callback.
pub type MarkerSink = Arc<dyn Fn(&MarkerUpdate) + Send + Sync>;
/// Problem-list callback, given the URI and its flattened lines.
pub type ProblemSink = Arc<dyn Fn(&str, &[String]) + Send + Sync>;

/// Source tag used for a language's markers.
pub fn source_tag(language_id: &str) -> String {
    format!("lsp:{language_id}")
}

#[derive(Default)]
struct RouterState {
    tracked: BTreeSet<String>,
    markers: BTreeMap<String, MarkerUpdate>,
    marker_sinks: Vec<MarkerSink>,
    problem_sinks: Vec<ProblemSink>,
}

#[derive(Default)]
pub struct DiagnosticsRouter {
    state: Mutex<RouterState>,
}

impl fmt::Debug for DiagnosticsRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("DiagnosticsRouter")
            .field("tracked", &state.tracked)
            .field("documents_with_markers", &state.markers.len())
            .field("marker_sinks", &state.marker_sinks.len())
            .field("problem_sinks", &state.problem_sinks.len())
            .finish()
    }
}

impl DiagnosticsRouter {
    /// A router with no tracked documents and no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink for marker updates.
    pub fn on_markers<F>(&self, sink: F)
    where
        F: Fn(&MarkerUpdate) + Send + Sync + 'static,
    {
        lock(&self.state).marker_sinks.push(Arc::new(sink));
    }

    /// Add a sink for flattened problem lines.
    pub fn on_problems<F>(&self, sink: F)
    where
        F: Fn(&str, &[String]) + Send + Sync + 'static,
    {
        lock(&self.state).problem_sinks.push(Arc::new(sink));
    }

    /// Accept pushes for `uri` from now on.
    pub fn track(&self, uri: &str) {
        lock(&self.state).tracked.insert(uri.to_string());
    }

    /// Whether pushes for `uri` are accepted.
    pub fn is_tracked(&self, uri: &str) -> bool {
        lock(&self.state).tracked.contains(uri)
    }

    /// Route one push. Pushes for documents that are not tracked are dropped.
    ///
    /// Returns the update handed to the sinks.
    pub fn publish(&self, source_tag: &str, params: PublishDiagnosticsParams) -> Option<MarkerUpdate> {
        let update = MarkerUpdate {
            uri: params.uri,
            source_tag: source_tag.to_string(),
            markers: params.diagnostics.into_iter().map(Marker::from).collect(),
        };

        let (marker_sinks, problem_sinks) = {
            let mut state = lock(&self.state);
            if !state.tracked.contains(&update.uri) {
                tracing::debug!(uri = %update.uri, "diagnostics for unknown document dropped");
                return None;
            }
            if update.markers.is_empty() {
                state.markers.remove(&update.uri);
            } else {
                state.markers.insert(update.uri.clone(), update.clone());
            }
            (state.marker_sinks.clone(), state.problem_sinks.clone())
        };

        tracing::trace!(uri = %update.uri, count = update.markers.len(), "diagnostics routed");
        emit(&marker_sinks, &problem_sinks, &update);
        Some(update)
    }

    /// Stop tracking `uri` and clear its markers in the sinks.
    pub fn untrack(&self, uri: &str) {
        let (previous, marker_sinks, problem_sinks) = {
            let mut state = lock(&self.state);
            state.tracked.remove(uri);
            (
                state.markers.remove(uri),
                state.marker_sinks.clone(),
                state.problem_sinks.clone(),
            )
        };
        if let Some(previous) = previous {
            let cleared = MarkerUpdate {
                markers: Vec::new(),
                ..previous
            };
            emit(&marker_sinks, &problem_sinks, &cleared);
        }
    }

    /// Untrack every document, clearing all markers.
    pub fn clear_all(&self) {
        let (previous, marker_sinks, problem_sinks) = {
            let mut state = lock(&self.state);
            state.tracked.clear();
            (
                std::mem::take(&mut state.markers),
                state.marker_sinks.clone(),
                state.problem_sinks.clone(),
            )
        };
        for (_, update) in previous {
            let cleared = MarkerUpdate {
                markers: Vec::new(),
                ..update
            };
            emit(&marker_sinks, &problem_sinks, &cleared);
        }
    }

    /// Current markers for `uri`.
    pub fn markers(&self, uri: &str) -> Vec<Marker> {
        lock(&self.state)
            .markers
            .get(uri)
            .map(|update| update.markers.clone())
            .unwrap_or_default()
    }

    /// Current problem lines for `uri`.
    pub fn problems(&self, uri: &str) -> Vec<String> {
        lock(&self.state)
            .markers
            .get(uri)
            .map(MarkerUpdate::problems)
            .unwrap_or_default()
    }

    /// Problem lines for every document that has any, ordered by URI.
    pub fn all_problems(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.state)
            .markers
            .iter()
            .map(|(uri, update)| (uri.clone(), update.problems()))
            .collect()
    }

    /// Markers across every document.
    pub fn total_count(&self) -> usize {
        lock(&self.state)
            .markers
            .values()
            .map(|update| update.markers.len())
            .sum()
    }

    /// Count of markers at `severity` across all documents.
    pub fn count_by_severity(&self, severity: MarkerSeverity) -> usize {
        lock(&self.state)
            .markers
            .values()
            .flat_map(|update| update.markers.iter())
            .filter(|marker| marker.severity == severity)
            .count()
    }
}

fn emit(marker_sinks: &[MarkerSink], problem_sinks: &[ProblemSink], update: &MarkerUpdate) {
    for sink in marker_sinks {
        sink(update);
    }
    if problem_sinks.is_empty() {
        return;
    }
    let problems = update.problems();
    for sink in problem_sinks {
        sink(&update.uri, &problems);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LspPosition, LspRange};
    use tether_core::EditorPosition;

    const URI: &str = "file:///workspaces/w/main.py";

    fn diagnostic(line: u32, message: &str, severity: Option<DiagnosticSeverity>) -> Diagnostic {
        Diagnostic {
            range: LspRange::new(LspPosition::new(line, 4), LspPosition::new(line, 9)),
            severity,
            message: message.into(),
            source: Some("pyflakes".into()),
            code: None,
        }
    }

    fn push(uri: &str, diagnostics: Vec<Diagnostic>) -> PublishDiagnosticsParams {
        PublishDiagnosticsParams {
            uri: uri.into(),
            version: None,
            diagnostics,
        }
    }

    fn tracked_router() -> DiagnosticsRouter {
        let router = DiagnosticsRouter::new();
        router.track(URI);
        router
    }

    #[test]
    fn severity_table() {
        assert_eq!(MarkerSeverity::from(Some(DiagnosticSeverity::Error)), MarkerSeverity::Error);
        assert_eq!(MarkerSeverity::from(Some(DiagnosticSeverity::Warning)), MarkerSeverity::Warning);
        assert_eq!(MarkerSeverity::from(Some(DiagnosticSeverity::Information)), MarkerSeverity::Info);
        assert_eq!(MarkerSeverity::from(Some(DiagnosticSeverity::Hint)), MarkerSeverity::Hint);
        assert_eq!(MarkerSeverity::from(None), MarkerSeverity::Warning);
    }

    #[test]
    fn ranges_are_translated_to_editor_coordinates() {
        let router = tracked_router();
        let update = router
            .publish("lsp:python", push(URI, vec![diagnostic(0, "unused import", None)]))
            .unwrap();
        let marker = &update.markers[0];
        assert_eq!(marker.range.start, EditorPosition::new(1, 5));
        assert_eq!(marker.range.end, EditorPosition::new(1, 10));
        assert_eq!(marker.severity, MarkerSeverity::Warning);
        assert_eq!(update.problems(), vec!["1:5 unused import".to_string()]);
    }

    #[test]
    fn later_push_replaces_earlier() {
        let router = tracked_router();
        router.publish(
            "lsp:python",
            push(
                URI,
                vec![
                    diagnostic(0, "a", Some(DiagnosticSeverity::Error)),
                    diagnostic(1, "b", Some(DiagnosticSeverity::Error)),
                ],
            ),
        );
        router.publish(
            "lsp:python",
            push(URI, vec![diagnostic(5, "c", Some(DiagnosticSeverity::Hint))]),
        );

        let markers = router.markers(URI);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].message, "c");
        assert_eq!(router.total_count(), 1);
    }

    #[test]
    fn empty_push_clears_document() {
        let router = tracked_router();
        router.publish("lsp:python", push(URI, vec![diagnostic(0, "a", None)]));
        let update = router.publish("lsp:python", push(URI, vec![])).unwrap();
        assert!(update.markers.is_empty());
        assert!(router.markers(URI).is_empty());
        assert!(router.all_problems().is_empty());
    }

    #[test]
    fn untracked_documents_are_ignored() {
        let router = DiagnosticsRouter::new();
        assert!(router
            .publish("lsp:python", push(URI, vec![diagnostic(0, "a", None)]))
            .is_none());
        assert_eq!(router.total_count(), 0);
    }

    #[test]
    fn sinks_receive_updates_and_problem_lines() {
        let router = tracked_router();
        let seen_markers = Arc::new(Mutex::new(Vec::new()));
        let seen_problems = Arc::new(Mutex::new(Vec::new()));

        let sink = seen_markers.clone();
        router.on_markers(move |update: &MarkerUpdate| {
            sink.lock().unwrap().push((update.source_tag.clone(), update.markers.len()))
        });
        let sink = seen_problems.clone();
        router.on_problems(move |uri: &str, lines: &[String]| {
            sink.lock().unwrap().push((uri.to_string(), lines.to_vec()))
        });

        router.publish(
            &source_tag("python"),
            push(URI, vec![diagnostic(2, "undefined name 'x'", Some(DiagnosticSeverity::Error))]),
        );

        assert_eq!(*seen_markers.lock().unwrap(), vec![("lsp:python".to_string(), 1)]);
        assert_eq!(
            *seen_problems.lock().unwrap(),
            vec![(URI.to_string(), vec!["3:5 undefined name 'x'".to_string()])]
        );
    }

    #[test]
    fn untrack_clears_sinks() {
        let router = tracked_router();
        let cleared = Arc::new(Mutex::new(Vec::new()));
        let sink = cleared.clone();
        router.on_markers(move |update: &MarkerUpdate| {
            if update.markers.is_empty() {
                sink.lock().unwrap().push(update.uri.clone());
            }
        });

        router.publish("lsp:python", push(URI, vec![diagnostic(0, "a", None)]));
        router.untrack(URI);

        assert!(!router.is_tracked(URI));
        assert!(router.markers(URI).is_empty());
        assert_eq!(*cleared.lock().unwrap(), vec![URI.to_string()]);
    }

    #[test]
    fn clear_all_and_counts() {
        let router = DiagnosticsRouter::new();
        let other = "file:///workspaces/w/other.py";
        router.track(URI);
        router.track(other);
        router.publish(
            "lsp:python",
            push(URI, vec![diagnostic(0, "a", Some(DiagnosticSeverity::Error))]),
        );
        router.publish(
            "lsp:python",
            push(
                other,
                vec![
                    diagnostic(0, "b", Some(DiagnosticSeverity::Error)),
                    diagnostic(1, "c", Some(DiagnosticSeverity::Hint)),
                ],
            ),
        );

        assert_eq!(router.count_by_severity(MarkerSeverity::Error), 2);
        assert_eq!(router.count_by_severity(MarkerSeverity::Hint), 1);
        let all = router.all_problems();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, URI);

        router.clear_all();
        assert_eq!(router.total_count(), 0);
        assert!(!router.is_tracked(URI));
    }
}
