//! Service identity and lock path resolution.
use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{config::ServiceConfig, runtime};

/// Resolved identity of a self-daemonized service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    /// Service name.
    pub name: String,
    /// Optional human-friendly name.
    pub display_name: Option<String>,
    /// Identity lock file: install marker, running lock and pid record.
    pub lock_path: PathBuf,
    /// Lock file serializing control operations for this identity.
    pub operations_lock_path: PathBuf,
}

impl ServiceIdentity {
    /// Resolves paths from the config, using `home` for defaults.
    pub fn resolve(config: &ServiceConfig, home: Option<&Path>) -> Self {
        let base = config.base_dir();
        let anchor = |raw: &str| {
            let path = PathBuf::from(raw);
            if path.is_absolute() {
                path
            } else {
                base.join(path)
            }
        };

        let lock_path = match config.lock_file.as_deref() {
            Some(raw) if !raw.is_empty() => anchor(raw),
            _ => runtime::default_lock_path(home, &config.name),
        };
        let operations_lock_path = match config.operations_lock_file.as_deref() {
            Some(raw) if !raw.is_empty() => anchor(raw),
            _ => runtime::default_operations_lock_path(&lock_path),
        };

        Self {
            name: config.name.clone(),
            display_name: config.display_name.clone(),
            lock_path,
            operations_lock_path,
        }
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.display_name.as_deref() {
            Some(display) if !display.is_empty() => f.write_str(display),
            _ => f.write_str(&self.name),
        }
    }
}
