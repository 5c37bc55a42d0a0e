//! Document URIs for files inside a workspace.
//!
//! Files live under `<root>/<workspace_id>/<relative path>`, so the editor
//! addresses them as `file://<root>/<workspace_id>/<relative path>`. With the
//! default root `/workspaces` that gives `file:///workspaces/{id}/{path}`.

/// Default directory under which every workspace is mounted.
pub const DEFAULT_WORKSPACE_ROOT: &str = "/workspaces";

fn trimmed_root(root: &str) -> &str {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        ""
    } else {
        root
    }
}

/// URI of the workspace folder itself (used as the server's root).
pub fn workspace_uri(root: &str, workspace_id: &str) -> String {
    format!("file://{}/{}", trimmed_root(root), workspace_id)
}

/// URI of a file inside a workspace.
pub fn document_uri(root: &str, workspace_id: &str, relative_path: &str) -> String {
    format!(
        "{}/{}",
        workspace_uri(root, workspace_id),
        relative_path.trim_start_matches('/')
    )
}

/// Inverse of [`document_uri`]: the workspace-relative path of `uri`, if it
/// belongs to `workspace_id`.
pub fn relative_path<'a>(root: &str, workspace_id: &str, uri: &'a str) -> Option<&'a str> {
    let prefix = workspace_uri(root, workspace_id);
    let rest = uri.strip_prefix(prefix.as_str())?;
    let rest = rest.strip_prefix('/')?;
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}
