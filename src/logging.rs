//! Tracing configuration and log routing.
//!
//! Logs go to stdout through a compact formatter and are mirrored to a file through a
//! non-blocking writer. The file is `MEDNOTES_LOG_FILE` when set, otherwise
//! `logs/mednotes.log`. Without `RUST_LOG`, the service logs at `info` while SQL statement
//! chatter from `sqlx` is held back to `warn`.
use std::{
    ffi::OsString,
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_ENV: &str = "MEDNOTES_LOG_FILE";
const LOG_DIR: &str = "logs";
const LOG_FILE_NAME: &str = "mednotes.log";
const DEFAULT_FILTER: &str = "info,sqlx=warn,tower_http=info,hyper=warn,reqwest=warn";

/// Configure tracing subscribers for stdout and file logging.
///
/// Safe to call more than once; only the first call installs the subscriber.
pub fn init_tracing() {
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(build_filter())
        .with(stdout_layer);

    let path = log_file_path(std::env::var_os(LOG_FILE_ENV));
    match open_log_writer(&path) {
        Ok(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            let _ = registry.with(file_layer).try_init();
        }
        Err(err) => {
            eprintln!("File logging disabled ({}): {err}", path.display());
            let _ = registry.try_init();
        }
    }
}

fn build_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn log_file_path(configured: Option<OsString>) -> PathBuf {
    configured
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(LOG_DIR).join(LOG_FILE_NAME))
}

/// Open `path` for appending (creating parent directories) behind a non-blocking writer.
fn open_log_writer(path: &Path) -> io::Result<NonBlocking> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Ok(writer)
}
