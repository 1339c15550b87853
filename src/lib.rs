//! Solod turns an arbitrary executable into a single-instance background service using
//! nothing but process creation, advisory file locks and signals. A per-service lock
//! file records the daemon pid and stays locked for as long as the daemon lives, which
//! makes `status` and `stop` crash-safe without a supervising parent.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Shared constants.
pub mod constants;

/// Fork and exec of the daemon image.
pub mod daemonize;

/// Error handling.
pub mod error;

/// Executable path, arguments and environment.
pub mod exec;

/// Service identity resolution.
pub mod identity;

/// Identity lock and operations lock files.
pub mod lock;

/// Log sink selection.
pub mod logging;

/// Liveness probe and termination.
pub mod process;

/// Runtime paths.
pub mod runtime;

/// Service control operations.
pub mod service;

#[doc(hidden)]
pub mod test_utils;
