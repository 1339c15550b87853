//! Runtime paths.
use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Reads `$HOME` from the process environment.
pub fn home_from_env() -> Option<PathBuf> {
    env::var_os("HOME").and_then(non_empty_path)
}

fn non_empty_path(value: OsString) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// Home directory when known, else the system temporary directory.
pub fn home_or_temp_dir(home: Option<&Path>) -> PathBuf {
    match home {
        Some(home) if !home.as_os_str().is_empty() => home.to_path_buf(),
        _ => env::temp_dir(),
    }
}

/// Default identity lock path (`<home-or-tmp>/<name>-service.lock`).
pub fn default_lock_path(home: Option<&Path>, service_name: &str) -> PathBuf {
    home_or_temp_dir(home).join(format!("{service_name}-service.lock"))
}

/// Default operations lock path: a sibling of the identity lock (`<lock_path>.ops`).
///
/// Keyed by the lock path rather than the service name, so same-named services with
/// different lock files never share a serializer.
pub fn default_operations_lock_path(lock_path: &Path) -> PathBuf {
    let mut path = lock_path.as_os_str().to_owned();
    path.push(".ops");
    PathBuf::from(path)
}

/// Log directory used by the system log sink.
pub fn log_dir(home: Option<&Path>) -> PathBuf {
    home_or_temp_dir(home).join(".local/state/solod/logs")
}
