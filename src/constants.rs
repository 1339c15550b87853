//! Constants shared by the control operations and the CLI.

// ============================================================================
// Forked Child Exit Codes
// ============================================================================

/// `setsid(2)` failed in the forked child.
pub const CHILD_EXIT_SETSID: i32 = 70;

/// Recording the pid in the identity lock file failed.
pub const CHILD_EXIT_RECORD_PID: i32 = 71;

/// Clearing close-on-exec on the identity lock descriptor failed.
pub const CHILD_EXIT_INHERIT_LOCK: i32 = 72;

/// Redirecting stdin/stdout/stderr to `/dev/null` failed.
pub const CHILD_EXIT_REDIRECT_STDIO: i32 = 73;

/// `execve(2)` returned.
pub const CHILD_EXIT_EXEC: i32 = 74;

// ============================================================================
// CLI Exit Codes
// ============================================================================

/// Generic failure.
pub const EXIT_FAILURE: i32 = 1;

/// `status`: service not running (LSB "program is not running").
pub const EXIT_STATUS_STOPPED: i32 = 3;

/// `status`: status could not be determined (LSB "program or service status is unknown").
pub const EXIT_STATUS_UNKNOWN: i32 = 4;

// ============================================================================
// Defaults
// ============================================================================

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "solod.yaml";

/// Environment variable with a tracing filter for the CLI, checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "SOLOD_LOG";

/// Default tracing filter.
pub const DEFAULT_LOG_FILTER: &str = "info";
