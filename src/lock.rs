//! Advisory lock files backing the identity lock and the operations serializer.
//!
//! Both locks are `flock(2)` locks taken through [`fs2::FileExt`]. They belong to the
//! open file description, so a descriptor inherited across `fork` and `exec` keeps the
//! lock alive until the last copy is closed. The kernel drops it when the holder exits,
//! however it exits.
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom},
    mem::ManuallyDrop,
    os::unix::{
        fs::FileExt as _,
        io::{AsRawFd, FromRawFd, IntoRawFd, RawFd},
    },
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::error::ServiceError;

fn ensure_parent_dir(path: &Path) -> Result<(), ServiceError> {
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
    Ok(())
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Blocking lock serializing `start`, `stop` and `status` for one identity.
///
/// Released when dropped.
#[derive(Debug)]
pub struct OperationsLock {
    file: File,
    path: PathBuf,
}

impl OperationsLock {
    /// Opens (creating if needed) the token file and waits for the exclusive lock.
    pub fn acquire(path: &Path) -> Result<Self, ServiceError> {
        ensure_parent_dir(path)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| {
                ServiceError::resource(
                    format!("Failed to open operations lock {}", path.display()),
                    err,
                )
            })?;

        file.lock_exclusive().map_err(|err| {
            ServiceError::resource(
                format!("Failed to lock operations lock {}", path.display()),
                err,
            )
        })?;
        debug!("Acquired operations lock {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Descriptor of the token file, closed by a forked child before it execs.
    pub fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for OperationsLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!(
                "Failed to unlock operations lock {}: {err}",
                self.path.display()
            );
        }
    }
}

/// Outcome of a non-blocking attempt on the identity lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// Nobody held the lock; this handle now does.
    Acquired,
    /// Another open file description holds the lock.
    Held,
}

/// Handle on the per-service identity lock file.
#[derive(Debug)]
pub struct IdentityLock {
    file: File,
    path: PathBuf,
}

impl IdentityLock {
    /// Opens the lock file read/write, creating it when absent.
    pub fn open_for_start(path: &Path) -> Result<Self, ServiceError> {
        ensure_parent_dir(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| Self::open_error(path, err))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing lock file read/write. `None` when the file is absent.
    pub fn open_existing(path: &Path) -> Result<Option<Self>, ServiceError> {
        Self::open_without_create(path, OpenOptions::new().read(true).write(true))
    }

    /// Opens an existing lock file read-only. `None` when the file is absent.
    pub fn open_for_query(path: &Path) -> Result<Option<Self>, ServiceError> {
        Self::open_without_create(path, OpenOptions::new().read(true))
    }

    fn open_without_create(
        path: &Path,
        options: &OpenOptions,
    ) -> Result<Option<Self>, ServiceError> {
        match options.open(path) {
            Ok(file) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::open_error(path, err)),
        }
    }

    fn open_error(path: &Path, err: io::Error) -> ServiceError {
        ServiceError::resource(format!("Failed to open lock file {}", path.display()), err)
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking exclusive lock attempt.
    pub fn try_acquire(&self) -> Result<LockAttempt, ServiceError> {
        match self.file.try_lock_exclusive() {
            Ok(()) => Ok(LockAttempt::Acquired),
            Err(err) if is_contended(&err) => Ok(LockAttempt::Held),
            Err(err) => Err(ServiceError::resource(
                format!("Failed to lock {}", self.path.display()),
                err,
            )),
        }
    }

    /// Blocks until every other holder has released the lock.
    pub fn wait_for_release(&self) -> Result<(), ServiceError> {
        self.file.lock_exclusive().map_err(|err| {
            ServiceError::resource(
                format!("Failed to wait for lock {}", self.path.display()),
                err,
            )
        })
    }

    /// Reads the recorded pid. Empty content yields `None`.
    pub fn read_pid(&mut self) -> Result<Option<i32>, ServiceError> {
        let mut contents = String::new();
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_string(&mut contents))
            .map_err(|err| {
                ServiceError::resource(format!("Failed to read {}", self.path.display()), err)
            })?;
        parse_pid(&contents).map_err(|_| ServiceError::ProcessIdCorrupted {
            path: self.path.clone(),
            contents,
        })
    }

    /// Replaces the content with `pid` in decimal and flushes it to storage.
    pub fn record_pid(&mut self, pid: u32) -> Result<(), ServiceError> {
        let digits = pid.to_string();
        self.file
            .write_all_at(digits.as_bytes(), 0)
            .and_then(|_| self.file.set_len(digits.len() as u64))
            .and_then(|_| self.file.sync_all())
            .map_err(|err| {
                ServiceError::resource(
                    format!("Failed to record PID in {}", self.path.display()),
                    err,
                )
            })
    }

    /// Truncates the stale pid record.
    pub fn clear(&self) -> Result<(), ServiceError> {
        self.file.set_len(0).map_err(|err| {
            ServiceError::resource(format!("Failed to clear {}", self.path.display()), err)
        })
    }

    /// Gives up RAII ownership of the descriptor so it can outlive this scope in a
    /// forked child or an exec'd image. Dropping the returned value does nothing.
    pub fn hand_off(self) -> InheritedLock {
        InheritedLock {
            fd: self.file.into_raw_fd(),
            path: self.path,
        }
    }
}

/// Lock file content that is neither empty nor a positive process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPid;

/// Parses lock file content. Empty (or whitespace-only) means no pid.
pub fn parse_pid(contents: &str) -> Result<Option<i32>, InvalidPid> {
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    // Zero and negative values address process groups when signalled.
    match trimmed.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(Some(pid)),
        _ => Err(InvalidPid),
    }
}

/// Raw identity lock descriptor detached from RAII ownership.
///
/// Closing it is equivalent to declaring the service stopped once no other copy
/// remains, so it is only ever closed explicitly.
#[derive(Debug)]
pub struct InheritedLock {
    fd: RawFd,
    path: PathBuf,
}

impl InheritedLock {
    /// The raw descriptor.
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publishes the daemon pid from the parent side of a fork.
    ///
    /// Uses positioned writes so the parent and child can both record the same pid
    /// through the shared open file description without racing on the offset.
    pub fn publish_pid(&self, pid: i32) -> io::Result<()> {
        let file = ManuallyDrop::new(unsafe { File::from_raw_fd(self.fd) });
        let digits = pid.to_string();
        file.write_all_at(digits.as_bytes(), 0)
            .and_then(|_| file.set_len(digits.len() as u64))
    }

    /// Closes the parent's copy without unlocking, leaving the child's copy as the holder.
    pub fn release_in_parent(self) {
        drop(unsafe { File::from_raw_fd(self.fd) });
    }

    /// Takes RAII ownership back, for when the hand-off did not happen.
    pub fn reclaim(self) -> IdentityLock {
        IdentityLock {
            file: unsafe { File::from_raw_fd(self.fd) },
            path: self.path,
        }
    }
}
