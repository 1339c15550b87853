//! Executable inputs for the daemon image.
//!
//! Everything `execve(2)` needs is materialised up front, including the null-terminated
//! pointer arrays, so the forked child never allocates.
use std::{
    collections::HashSet,
    env,
    ffi::{CStr, CString, OsStr, OsString},
    io,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
    ptr,
};

use libc::c_char;
use tracing::debug;

use crate::{config::ServiceConfig, error::ServiceError};

/// Snapshot of the environment the daemon inherits.
#[derive(Debug, Clone, Default)]
pub struct AmbientEnv {
    vars: Vec<(OsString, OsString)>,
}

impl AmbientEnv {
    /// Captures the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: env::vars_os().collect(),
        }
    }

    /// Builds a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.as_os_str(), value.as_os_str()))
    }
}

/// Path, argument vector and environment for the daemon image.
#[derive(Debug, Clone)]
pub struct ExecInputs {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
}

fn to_cstring(bytes: &[u8]) -> Result<CString, ServiceError> {
    CString::new(bytes).map_err(|_| ServiceError::InvalidExecInput {
        value: String::from_utf8_lossy(bytes).into_owned(),
    })
}

fn env_entry(key: &[u8], value: &[u8]) -> Result<CString, ServiceError> {
    if key.is_empty() || key.contains(&b'=') {
        return Err(ServiceError::InvalidExecInput {
            value: String::from_utf8_lossy(key).into_owned(),
        });
    }
    let mut entry = Vec::with_capacity(key.len() + value.len() + 1);
    entry.extend_from_slice(key);
    entry.push(b'=');
    entry.extend_from_slice(value);
    to_cstring(&entry)
}

/// Resolves the executable to an absolute path that exists.
pub fn resolve_executable(config: &ServiceConfig) -> Result<PathBuf, ServiceError> {
    let candidate = PathBuf::from(&config.executable);
    let resolved = if candidate.is_absolute() {
        candidate
    } else {
        config.base_dir().join(candidate)
    };

    if !resolved.is_file() {
        return Err(ServiceError::ExecutableNotFound { path: resolved });
    }
    Ok(resolved)
}

impl ExecInputs {
    /// Builds the exec inputs for `config`.
    ///
    /// Configured variables take precedence over the ambient snapshot on key collision.
    /// The merged environment lists configured entries first, sorted by key, followed by
    /// the remaining ambient entries in their original order.
    pub fn prepare(config: &ServiceConfig, ambient: &AmbientEnv) -> Result<Self, ServiceError> {
        let executable = resolve_executable(config)?;
        let path = to_cstring(executable.as_os_str().as_bytes())?;

        let mut argv = Vec::with_capacity(config.arguments.len() + 1);
        argv.push(path.clone());
        for argument in &config.arguments {
            argv.push(to_cstring(argument.as_bytes())?);
        }

        let mut configured: Vec<_> = config.configured_env().into_iter().collect();
        configured.sort();

        let mut seen = HashSet::new();
        let mut envp = Vec::new();
        for (key, value) in &configured {
            envp.push(env_entry(key.as_bytes(), value.as_bytes())?);
            seen.insert(OsString::from(key));
        }
        for (key, value) in ambient.iter() {
            if key.is_empty() || !seen.insert(key.to_os_string()) {
                continue;
            }
            envp.push(env_entry(key.as_bytes(), value.as_bytes())?);
        }

        debug!(
            "Prepared exec inputs for '{}': {} args, {} env entries ({} configured)",
            config.name,
            argv.len(),
            envp.len(),
            configured.len()
        );

        Ok(Self { path, argv, envp })
    }

    /// Absolute executable path.
    pub fn executable(&self) -> &Path {
        Path::new(OsStr::from_bytes(self.path.as_bytes()))
    }

    /// Argument vector, starting with the executable path.
    pub fn args(&self) -> impl Iterator<Item = &CStr> {
        self.argv.iter().map(CString::as_c_str)
    }

    /// Merged environment as `KEY=VALUE` entries.
    pub fn env(&self) -> impl Iterator<Item = &CStr> {
        self.envp.iter().map(CString::as_c_str)
    }

    /// Builds the pointer arrays handed to `execve(2)`.
    pub fn image(&self) -> ExecImage<'_> {
        let pointers = |items: &[CString]| {
            items
                .iter()
                .map(|item| item.as_ptr())
                .chain(std::iter::once(ptr::null()))
                .collect::<Vec<*const c_char>>()
        };
        ExecImage {
            path: &self.path,
            argv: pointers(self.argv.as_slice()),
            envp: pointers(self.envp.as_slice()),
        }
    }
}

/// Ready-to-exec view over [`ExecInputs`].
#[derive(Debug)]
pub struct ExecImage<'a> {
    path: &'a CStr,
    argv: Vec<*const c_char>,
    envp: Vec<*const c_char>,
}

impl ExecImage<'_> {
    /// Replaces the current process image. Only returns on failure.
    ///
    /// Performs no allocation, so it is usable in a forked child of a threaded process.
    pub fn exec(&self) -> io::Error {
        unsafe {
            libc::execve(self.path.as_ptr(), self.argv.as_ptr(), self.envp.as_ptr());
        }
        io::Error::last_os_error()
    }
}
