//! Logging initialization

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }))
}

/// Initialize logging
///
/// Logs go to stderr unless `log_file` is given. With `debug` and no file, a
/// temp log file is created so command output on stdout stays clean; its path
/// is returned.
pub fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<Option<PathBuf>> {
    let path = match log_file {
        Some(path) => Some(path.to_path_buf()),
        None if debug => Some(temp_log_path()),
        None => None,
    };

    match &path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;

            tracing_subscriber::fmt()
                .with_writer(file)
                .with_env_filter(env_filter(debug))
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter(debug))
                .with_target(false)
                .init();
        }
    }

    Ok(path)
}

fn temp_log_path() -> PathBuf {
    tempfile::Builder::new()
        .prefix("cattle-harness-")
        .suffix(".log")
        .tempfile()
        .and_then(|f| f.keep().map_err(|e| e.error))
        .map(|(_, path)| path)
        .unwrap_or_else(|_| {
            std::env::temp_dir().join(format!("cattle-harness-{}.log", std::process::id()))
        })
}
