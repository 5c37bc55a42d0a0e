use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Log file override; the platform data dir is used when unset.
    pub file: Option<PathBuf>,
}

/// How to launch the language server for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LspServerEntry {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// File extensions (without the dot) routed to this server.
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Language-server bridge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LspConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Quiet period before a burst of edits is sent as one change.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Per-request reply deadline in seconds; 0 waits forever.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Directory under which workspaces are mounted.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
    /// Servers keyed by language id.
    #[serde(default)]
    pub servers: HashMap<String, LspServerEntry>,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_workspace_root() -> String {
    "/workspaces".to_string()
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            workspace_root: default_workspace_root(),
            servers: HashMap::new(),
        }
    }
}

impl LspConfig {
    /// The debounce window as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// `None` when requests should never time out.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Language id whose server claims the extension of `path`.
    pub fn language_for_path(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        let mut matches: Vec<&str> = self
            .servers
            .iter()
            .filter(|(_, entry)| entry.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .map(|(lang, _)| lang.as_str())
            .collect();
        // Several servers may claim one extension; pick deterministically.
        matches.sort_unstable();
        matches.first().copied()
    }
}

/// Top-level tether configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub lsp: LspConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_entry() -> LspServerEntry {
        LspServerEntry {
            command: "pylsp".into(),
            args: vec![],
            extensions: vec!["py".into(), "pyi".into()],
        }
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
        assert!(cfg.lsp.enabled);
        assert_eq!(cfg.lsp.debounce_ms, 300);
        assert_eq!(cfg.lsp.request_timeout_secs, 30);
        assert_eq!(cfg.lsp.workspace_root, "/workspaces");
        assert!(cfg.lsp.servers.is_empty());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty toml");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn parse_servers_table() {
        let input = r#"
[lsp]
debounce_ms = 150

[lsp.servers.python]
command = "pylsp"
extensions = ["py"]

[lsp.servers.rust]
command = "rust-analyzer"
args = ["--log-file", "/tmp/ra.log"]
"#;
        let cfg: Config = toml::from_str(input).expect("parse toml");
        assert_eq!(cfg.lsp.debounce_ms, 150);
        assert_eq!(cfg.lsp.request_timeout_secs, 30);
        assert_eq!(cfg.lsp.servers["python"].command, "pylsp");
        assert_eq!(cfg.lsp.servers["rust"].args.len(), 2);
        assert!(cfg.lsp.servers["rust"].extensions.is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let mut cfg = Config::default();
        cfg.log.level = LogLevel::Debug;
        cfg.lsp.servers.insert("python".into(), python_entry());
        let text = toml::to_string(&cfg).expect("serialize");
        let back: Config = toml::from_str(&text).expect("deserialize");
        assert_eq!(back, cfg);
    }

    #[test]
    fn request_timeout_zero_disables() {
        let mut lsp = LspConfig::default();
        assert_eq!(lsp.request_timeout(), Some(Duration::from_secs(30)));
        lsp.request_timeout_secs = 0;
        assert_eq!(lsp.request_timeout(), None);
    }

    #[test]
    fn debounce_duration() {
        assert_eq!(LspConfig::default().debounce(), Duration::from_millis(300));
    }

    #[test]
    fn language_for_path_matches_extension() {
        let mut lsp = LspConfig::default();
        lsp.servers.insert("python".into(), python_entry());
        assert_eq!(lsp.language_for_path(Path::new("src/app.PY")), Some("python"));
        assert_eq!(lsp.language_for_path(Path::new("notes.txt")), None);
        assert_eq!(lsp.language_for_path(Path::new("Makefile")), None);
    }

    #[test]
    fn log_level_names() {
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(LogLevel::default().as_str(), "info");
    }
}
