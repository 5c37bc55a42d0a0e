use crate::config::Config;
use crate::error::ConfigError;

const DEBOUNCE_RANGE: std::ops::RangeInclusive<u64> = 10..=5000;

/// Check every constraint on `config`, collecting all violations.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let lsp = &config.lsp;

    if !DEBOUNCE_RANGE.contains(&lsp.debounce_ms) {
        errors.push(ConfigError::Validation {
            field: "lsp.debounce_ms".to_string(),
            message: format!(
                "must be {}..={}, got {}",
                DEBOUNCE_RANGE.start(),
                DEBOUNCE_RANGE.end(),
                lsp.debounce_ms
            ),
        });
    }

    if !lsp.workspace_root.starts_with('/') {
        errors.push(ConfigError::Validation {
            field: "lsp.workspace_root".to_string(),
            message: format!("must be an absolute path, got {:?}", lsp.workspace_root),
        });
    }

    let mut languages: Vec<&String> = lsp.servers.keys().collect();
    languages.sort();
    for lang in languages {
        let entry = &lsp.servers[lang];
        if entry.command.trim().is_empty() {
            errors.push(ConfigError::Validation {
                field: format!("lsp.servers.{lang}.command"),
                message: "must not be empty".to_string(),
            });
        }
        if let Some(bad) = entry.extensions.iter().find(|e| e.starts_with('.')) {
            errors.push(ConfigError::Validation {
                field: format!("lsp.servers.{lang}.extensions"),
                message: format!("write extensions without the dot, got {bad:?}"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
