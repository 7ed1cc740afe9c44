use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "CARDCHAT_LOG";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("invalid log filter {filter:?}: {message}")]
    Filter { filter: String, message: String },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Installs a file-backed subscriber. The terminal belongs to the TUI, so nothing is written
/// to stderr.
pub fn init_logging(state_dir: &Path, filter: Option<String>) -> Result<PathBuf, LoggingError> {
    let path = state_dir.join("cardchat.log");
    let file = open_log_file(&path)?;

    let filter_text = filter
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let env_filter = EnvFilter::try_new(&filter_text).map_err(|error| LoggingError::Filter {
        filter: filter_text.clone(),
        message: error.to_string(),
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(Arc::new(file))
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)?;

    Ok(path)
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let open_error = |source| LoggingError::Open {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(open_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(open_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_file_is_created_in_nested_state_dir() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("cardchat.log");
        open_log_file(&path).expect("open");
        assert!(path.exists());
    }
}
