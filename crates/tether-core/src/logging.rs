//! Log-file housekeeping for the `tether` binary.
//!
//! Subscriber setup lives in the binary crate; this module only deals with
//! the file on disk and with turning a level name into a filter directive.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Size-based rotation policy: `tether.log` → `tether.log.1` → … → dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    /// Rotate once the live file reaches this many bytes.
    pub max_bytes: u64,
    /// Number of rotated generations kept next to the live file.
    pub keep: u32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            keep: 5,
        }
    }
}

impl Rotation {
    /// Rotate `log_path` if it has grown past `max_bytes`.
    ///
    /// Returns `true` when a rotation happened.
    pub fn rotate_if_needed(&self, log_path: &Path) -> io::Result<bool> {
        let len = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if len < self.max_bytes {
            return Ok(false);
        }

        let oldest = generation(log_path, self.keep);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.keep).rev() {
            let from = generation(log_path, n);
            if from.exists() {
                fs::rename(&from, generation(log_path, n + 1))?;
            }
        }
        if self.keep == 0 {
            fs::remove_file(log_path)?;
        } else {
            fs::rename(log_path, generation(log_path, 1))?;
        }
        tracing::debug!(path = %log_path.display(), bytes = len, "rotated log file");
        Ok(true)
    }
}

/// Create the directory that will hold `log_path`.
pub fn prepare_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Map a configured level name onto a `tracing` filter directive.
///
/// Unknown names fall back to `"info"`.
pub fn filter_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn generation(base: &Path, n: u32) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    base.with_file_name(name)
}
