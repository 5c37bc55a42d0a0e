use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

const CONFIG_FILE: &str = "config.toml";
const PROJECT_DIR: &str = ".tether";

/// Written to `config.toml` the first time tether runs.
const DEFAULT_CONFIG_CONTENT: &str = r#"# tether configuration
# Uncomment and edit settings below to override defaults.

# [log]
# level = "info"
# file = "/tmp/tether.log"

# [lsp]
# enabled = true
# debounce_ms = 300
# request_timeout_secs = 30
# workspace_root = "/workspaces"

# [lsp.servers.python]
# command = "pylsp"
# extensions = ["py"]

# [lsp.servers.typescript]
# command = "typescript-language-server"
# args = ["--stdio"]
# extensions = ["ts", "tsx", "js"]
"#;

/// Load the layered configuration.
///
/// `Config::default()` ← `config_dir/config.toml` ← the nearest
/// `.tether/config.toml` at or above `project_dir`, then validated. The
/// global file is created with commented-out defaults when missing.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join(CONFIG_FILE);

    if !global_path.exists() {
        std::fs::create_dir_all(config_dir)?;
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!(path = %global_path.display(), "created default config");
    }

    let mut config = Config::default();

    let global = std::fs::read_to_string(&global_path)?;
    if has_settings(&global) {
        config = merge_configs(&config, &global)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!(path = %project_path.display(), "applying project config");
        let project = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project)?;
    }

    check(config)
}

/// Parse and validate a standalone TOML document.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    check(config)
}

fn check(config: Config) -> Result<Config, ConfigError> {
    match validate(&config) {
        Ok(()) => Ok(config),
        Err(errors) => Err(errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })),
    }
}

/// Nearest `.tether/config.toml` walking upward from `start`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

fn has_settings(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}
