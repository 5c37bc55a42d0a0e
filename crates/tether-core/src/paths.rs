//! Per-user directories for configuration and logs.
use std::path::PathBuf;

use crate::error::CoreError;

const APP_DIR: &str = "tether";

/// Resolved application directories rooted at the user's home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    home: PathBuf,
}

impl AppPaths {
    /// Resolve the home directory from the platform, falling back to `$HOME`.
    pub fn discover() -> Result<Self, CoreError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .ok_or(CoreError::NoHomeDir)?;
        Ok(Self { home })
    }

    /// Build paths under an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// `~/.config/tether`
    pub fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join(APP_DIR)
    }

    /// `~/.local/share/tether`
    pub fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join(APP_DIR)
    }

    /// `<data_dir>/logs/tether.log`
    pub fn log_file(&self) -> PathBuf {
        self.data_dir().join("logs").join("tether.log")
    }
}
