//! Diagnostic logging setup.
//!
//! The TUI owns the terminal, so its diagnostics go to a file under the
//! platform data directory (or `--log-file`); one-shot modes log to stderr.
//! Filtering follows `RUST_LOG`, defaulting to `info`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Initialize the global subscriber. The returned guard must live as long as
/// the process when file logging is active.
pub fn init(log_file: Option<&Path>, use_file: bool) -> Result<Option<WorkerGuard>> {
    if !use_file {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    }

    let path = match log_file {
        Some(path) => path.to_path_buf(),
        None => default_log_path(),
    };
    let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cursor-reset-cli.log".to_string());

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cursor-reset-cli")
        .join("cursor-reset-cli.log")
}
