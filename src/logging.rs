//! Log sink selection for the control program.
use std::{
    fs::{self, OpenOptions},
    io::{self, IsTerminal},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::EnvFilter;

use crate::{
    constants::{DEFAULT_LOG_FILTER, LOG_ENV_VAR},
    runtime,
};

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    /// Human-readable output on stderr.
    Console,
    /// Append-only log file for non-interactive invocations.
    System {
        /// Log file path.
        path: PathBuf,
    },
}

impl LogSink {
    /// Console when stderr is a terminal, otherwise the system log file for `service`.
    pub fn detect(service: &str, home: Option<&Path>) -> Self {
        Self::select(io::stderr().is_terminal(), service, home)
    }

    /// Picks the sink for an interactive or non-interactive session.
    pub fn select(interactive: bool, service: &str, home: Option<&Path>) -> Self {
        if interactive {
            LogSink::Console
        } else {
            LogSink::System {
                path: runtime::log_dir(home).join(format!("{service}.log")),
            }
        }
    }
}

/// Builds the filter: explicit level, then `SOLOD_LOG`, then `RUST_LOG`, then `info`.
pub fn build_filter(level: Option<&str>) -> EnvFilter {
    if let Some(level) = level {
        return EnvFilter::new(level);
    }
    if let Ok(directives) = std::env::var(LOG_ENV_VAR)
        && let Ok(filter) = EnvFilter::try_new(&directives)
    {
        return filter;
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber for `sink`. Falls back to the console when the log
/// file cannot be opened.
pub fn init(sink: &LogSink, level: Option<&str>) {
    let filter = build_filter(level);

    if let LogSink::System { path } = sink {
        match open_log_file(path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(err) => {
                eprintln!(
                    "solod: cannot open log file {}: {err}; logging to stderr",
                    path.display()
                );
            }
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn open_log_file(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
