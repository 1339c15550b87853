//! Self-daemonized service control: `start`, `stop`, `restart`, `status`, `install`,
//! `uninstall` and `run`.
//!
//! The identity lock file is the single source of truth. Whoever holds its `flock` is the
//! running daemon, and the kernel releases that lock whenever the daemon dies, so a crash
//! can never leave the service looking alive. `start`, `stop` and `status` run inside the
//! per-identity operations lock so concurrent invocations never interleave their
//! check-then-act sequences.
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    io,
    path::Path,
};
use strum::Display;
use tracing::{debug, info, warn};

use crate::{
    config::ServiceConfig,
    daemonize,
    error::ServiceError,
    exec::{AmbientEnv, ExecInputs},
    identity::ServiceIdentity,
    lock::{IdentityLock, LockAttempt, OperationsLock},
    process::{self, Liveness},
    runtime,
};

/// Derived service state. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Lock free or lock file absent.
    Stopped,
    /// Lock held and the recorded process is alive.
    Running,
    /// The state could not be determined.
    Unknown,
}

/// Status plus the details behind it.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Service name.
    pub name: String,
    /// Derived state.
    pub status: Status,
    /// Daemon pid when running.
    pub pid: Option<i32>,
    /// Identity lock file path.
    pub lock_file: String,
    /// Failure that led to [`Status::Unknown`].
    pub error: Option<String>,
}

/// What the identity lock says about the service.
enum Observation {
    NotRunning,
    Running { lock: IdentityLock, pid: i32 },
}

/// A service daemonized by forking the control process, without a service manager.
#[derive(Debug, Clone)]
pub struct SelfDaemonizedService {
    config: ServiceConfig,
    identity: ServiceIdentity,
    ambient: AmbientEnv,
}

impl SelfDaemonizedService {
    /// Builds a service using `$HOME` and the current environment.
    pub fn new(config: ServiceConfig) -> Self {
        let home = runtime::home_from_env();
        Self::with_context(config, home.as_deref(), AmbientEnv::capture())
    }

    /// Builds a service from an explicit home directory and environment snapshot.
    pub fn with_context(config: ServiceConfig, home: Option<&Path>, ambient: AmbientEnv) -> Self {
        let identity = ServiceIdentity::resolve(&config, home);
        Self {
            config,
            identity,
            ambient,
        }
    }

    /// Resolved identity.
    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    fn serialize_operations(&self) -> Result<OperationsLock, ServiceError> {
        OperationsLock::acquire(&self.identity.operations_lock_path)
    }

    /// Checks the lock and, when held, the recorded pid and its liveness.
    ///
    /// A free lock, an empty pid record and a vanished process all read as not running.
    fn observe(&self, lock: Option<IdentityLock>) -> Result<Observation, ServiceError> {
        let Some(mut lock) = lock else {
            debug!("Lock file {} absent", self.identity.lock_path.display());
            return Ok(Observation::NotRunning);
        };

        if lock.try_acquire()? == LockAttempt::Acquired {
            debug!("Lock {} is free", self.identity.lock_path.display());
            return Ok(Observation::NotRunning);
        }

        let Some(pid) = lock.read_pid()? else {
            debug!(
                "Lock {} held without a PID record; treating '{}' as stopped",
                self.identity.lock_path.display(),
                self.identity.name
            );
            return Ok(Observation::NotRunning);
        };

        match process::probe(pid)? {
            Liveness::Alive => Ok(Observation::Running { lock, pid }),
            Liveness::Gone => Ok(Observation::NotRunning),
        }
    }

    /// Acquires the identity lock for a new instance, failing when one is running.
    fn claim_identity(&self) -> Result<IdentityLock, ServiceError> {
        let lock = IdentityLock::open_for_start(&self.identity.lock_path)?;
        match lock.try_acquire()? {
            LockAttempt::Acquired => Ok(lock),
            LockAttempt::Held => Err(ServiceError::AlreadyRunning {
                service: self.identity.to_string(),
            }),
        }
    }

    /// Forks and execs the daemon. Returns its pid once forked, without waiting on it.
    pub fn start(&self) -> Result<i32, ServiceError> {
        let operations = self.serialize_operations()?;
        let inputs = ExecInputs::prepare(&self.config, &self.ambient)?;
        let lock = self.claim_identity()?;

        let pid = daemonize::spawn_daemon(&inputs, lock, &operations)?;
        drop(operations);

        info!("Started '{}' with PID {pid}", self.identity);
        Ok(pid)
    }

    /// Terminates the daemon and waits until it has released the identity lock.
    ///
    /// Succeeds without doing anything when the service is not running.
    pub fn stop(&self) -> Result<(), ServiceError> {
        let _operations = self.serialize_operations()?;

        let lock = IdentityLock::open_existing(&self.identity.lock_path)?;
        let (lock, pid) = match self.observe(lock)? {
            Observation::NotRunning => {
                info!("Service '{}' is not running", self.identity);
                return Ok(());
            }
            Observation::Running { lock, pid } => (lock, pid),
        };

        if process::terminate(pid)? == Liveness::Gone {
            info!("Service '{}' (PID {pid}) already exited", self.identity);
            return Ok(());
        }

        debug!("Sent SIGTERM to PID {pid}; waiting for lock release");
        lock.wait_for_release()?;
        lock.clear()?;

        info!("Stopped '{}' (PID {pid})", self.identity);
        Ok(())
    }

    /// Stops then starts. Either failure short-circuits.
    pub fn restart(&self) -> Result<i32, ServiceError> {
        self.stop()?;
        self.start()
    }

    /// Current status. Failures are logged and reported as [`Status::Unknown`].
    pub fn status(&self) -> Status {
        self.status_report().status
    }

    /// Current status with pid and failure detail.
    pub fn status_report(&self) -> StatusReport {
        let (status, pid, error) = match self.try_status() {
            Ok((status, pid)) => (status, pid, None),
            Err(err) => {
                warn!("Failed to determine status of '{}': {err}", self.identity);
                (Status::Unknown, None, Some(err.to_string()))
            }
        };

        StatusReport {
            name: self.identity.name.clone(),
            status,
            pid,
            lock_file: self.identity.lock_path.display().to_string(),
            error,
        }
    }

    fn try_status(&self) -> Result<(Status, Option<i32>), ServiceError> {
        let _operations = self.serialize_operations()?;
        let lock = IdentityLock::open_for_query(&self.identity.lock_path)?;
        Ok(match self.observe(lock)? {
            Observation::NotRunning => (Status::Stopped, None),
            Observation::Running { pid, .. } => (Status::Running, Some(pid)),
        })
    }

    /// Creates the empty lock file that marks the service as installed.
    pub fn install(&self) -> Result<(), ServiceError> {
        let path = &self.identity.lock_path;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| {
                ServiceError::resource(
                    format!("Failed to create directory {}", parent.display()),
                    err,
                )
            })?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => {
                info!("Installed '{}' at {}", self.identity, path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(ServiceError::AlreadyInstalled { path: path.clone() })
            }
            Err(err) => Err(ServiceError::resource(
                format!("Failed to create {}", path.display()),
                err,
            )),
        }
    }

    /// Deletes the lock file.
    pub fn uninstall(&self) -> Result<(), ServiceError> {
        let path = &self.identity.lock_path;
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Uninstalled '{}'", self.identity);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ServiceError::NotInstalled { path: path.clone() })
            }
            Err(err) => Err(ServiceError::resource(
                format!("Failed to remove {}", path.display()),
                err,
            )),
        }
    }

    /// Replaces the current process with the target executable, holding the identity
    /// lock across the exec. Only returns on failure.
    pub fn run(&self) -> Result<std::convert::Infallible, ServiceError> {
        let operations = self.serialize_operations()?;
        let inputs = ExecInputs::prepare(&self.config, &self.ambient)?;
        let mut lock = self.claim_identity()?;
        lock.record_pid(std::process::id())?;

        let inherited = lock.hand_off();
        let fd = inherited.as_raw_fd();
        let cleared = unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            flags >= 0 && libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) >= 0
        };
        if !cleared {
            let source = io::Error::last_os_error();
            let lock = inherited.reclaim();
            let _ = lock.clear();
            return Err(ServiceError::resource(
                "Failed to keep lock descriptor open across exec",
                source,
            ));
        }
        drop(operations);

        info!(
            "Running '{}' in the foreground as {}",
            self.identity,
            inputs.executable().display()
        );
        let source = inputs.image().exec();

        let lock = inherited.reclaim();
        let _ = lock.clear();
        Err(ServiceError::resource(
            format!("Failed to exec {}", inputs.executable().display()),
            source,
        ))
    }
}
