//! Tracing subscriber setup.
//!
//! The interactive view owns the terminal, so `chat` logs go to a file. The
//! one-shot surfaces log to stderr. Installing twice is a no-op.

use crate::error::{GhostError, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "GHOST_LOG";
pub const LOG_PATH_ENV: &str = "GHOST_LOG_PATH";
const DEFAULT_FILTER: &str = "warn";
const LOG_FILE_NAME: &str = "ghost.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    /// `GHOST_LOG_PATH` if set, otherwise `<data_dir>/ghost.log`.
    pub fn file_in(data_dir: &Path) -> Self {
        let path = std::env::var(LOG_PATH_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(LOG_FILE_NAME));
        Self::File(path)
    }
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init(target: &LogTarget) -> Result<()> {
    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GhostError::io(format!("creating log directory {}", parent.display()), e)
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| GhostError::io(format!("opening log file {}", path.display()), e))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init();
        }
    }
    Ok(())
}
