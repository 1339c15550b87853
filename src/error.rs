//! Error handling for solod.
use std::{io, path::PathBuf};

use nix::{errno::Errno, sys::signal::Signal};
use thiserror::Error;

/// Defines all possible failures of the service control operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// `start` or `run` found the identity lock already held.
    #[error("Service '{service}' is already running")]
    AlreadyRunning {
        /// The service name that is already running.
        service: String,
    },

    /// `install` found an existing lock file.
    #[error("Service already installed: {}", path.display())]
    AlreadyInstalled {
        /// The lock file that already exists.
        path: PathBuf,
    },

    /// `uninstall` found no lock file.
    #[error("Service not installed: {}", path.display())]
    NotInstalled {
        /// The lock file that was expected.
        path: PathBuf,
    },

    /// The lock file holds something that is not a process id.
    #[error("Lock file {} holds a corrupted process id: {contents:?}", path.display())]
    ProcessIdCorrupted {
        /// The lock file that was read.
        path: PathBuf,
        /// The raw contents found in the file.
        contents: String,
    },

    /// Opening, locking, writing a file or creating a process failed.
    #[error("{context}: {source}")]
    ResourceUnavailable {
        /// What was being attempted.
        context: String,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// A signal could not be delivered for a reason other than the process being gone.
    #[error("Failed to deliver {signal} to PID {pid}: {source}")]
    SignalDeliveryDenied {
        /// The target process id.
        pid: i32,
        /// Human-readable signal name.
        signal: String,
        /// The errno reported by `kill(2)`.
        #[source]
        source: Errno,
    },

    /// Error reading a configuration file.
    #[error("Failed to read config file {}: {source}", path.display())]
    ConfigRead {
        /// The configuration path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// A `${VAR}` reference in the configuration has no value.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// The variable name.
        name: String,
    },

    /// The configured executable does not exist.
    #[error("Executable not found: {}", path.display())]
    ExecutableNotFound {
        /// The resolved executable path.
        path: PathBuf,
    },

    /// An argument, path or environment entry contains an interior NUL byte.
    #[error("Exec input contains a NUL byte: {value:?}")]
    InvalidExecInput {
        /// The offending value.
        value: String,
    },
}

impl ServiceError {
    /// Wraps an I/O error with a short description of the attempted action.
    pub fn resource(context: impl Into<String>, source: io::Error) -> Self {
        ServiceError::ResourceUnavailable {
            context: context.into(),
            source,
        }
    }

    /// Builds a signal delivery failure.
    pub fn signal_denied(pid: i32, signal: Option<Signal>, source: Errno) -> Self {
        let signal = match signal {
            Some(signal) => signal.as_str().to_string(),
            None => "liveness probe".to_string(),
        };
        ServiceError::SignalDeliveryDenied {
            pid,
            signal,
            source,
        }
    }

    /// Returns true when `start` failed only because the service is up.
    pub fn is_already_running(&self) -> bool {
        matches!(self, ServiceError::AlreadyRunning { .. })
    }
}
