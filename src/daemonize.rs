//! Fork-based daemonization of the target executable.
//!
//! The parent forks while holding the identity lock. The child becomes a session leader,
//! records its pid, makes the lock descriptor survive `execve(2)`, detaches its standard
//! streams and execs the target. The daemon image then holds the lock for its whole
//! lifetime.
//!
//! The child runs in a copy of a possibly multi-threaded process, so after `fork` it only
//! issues raw system calls and never allocates, logs or unwinds.
use std::os::unix::io::RawFd;

use nix::unistd::{ForkResult, fork};
use tracing::{debug, warn};

use crate::{
    constants::{
        CHILD_EXIT_EXEC, CHILD_EXIT_INHERIT_LOCK, CHILD_EXIT_RECORD_PID,
        CHILD_EXIT_REDIRECT_STDIO, CHILD_EXIT_SETSID,
    },
    error::ServiceError,
    exec::{ExecImage, ExecInputs},
    lock::{IdentityLock, OperationsLock},
};

/// Largest decimal rendering of a pid, sign included.
const PID_DIGITS: usize = 11;

/// Writes `pid` as decimal ASCII into `buf`, returning the used tail.
fn format_pid(pid: i32, buf: &mut [u8; PID_DIGITS]) -> &[u8] {
    let mut value = pid.unsigned_abs();
    let mut start = buf.len();
    loop {
        start -= 1;
        buf[start] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    if pid < 0 {
        start -= 1;
        buf[start] = b'-';
    }
    &buf[start..]
}

/// Forks the daemon. Returns the child's pid in the parent.
///
/// `identity` must already hold the lock. `operations` stays held by the caller and is
/// released once this returns.
pub fn spawn_daemon(
    inputs: &ExecInputs,
    identity: IdentityLock,
    operations: &OperationsLock,
) -> Result<i32, ServiceError> {
    let image = inputs.image();
    let operations_fd = operations.as_raw_fd();
    let inherited = identity.hand_off();
    let lock_fd = inherited.as_raw_fd();

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            let pid = child.as_raw();
            if let Err(err) = inherited.publish_pid(pid) {
                warn!(
                    "Failed to pre-record PID {pid} in {}: {err}",
                    inherited.path().display()
                );
            }
            inherited.release_in_parent();
            debug!("Forked daemon process {pid} for {}", inputs.executable().display());
            Ok(pid)
        }
        Ok(ForkResult::Child) => unsafe { become_daemon(lock_fd, operations_fd, &image) },
        Err(errno) => {
            drop(inherited.reclaim());
            Err(ServiceError::resource(
                "Failed to fork daemon process",
                std::io::Error::from(errno),
            ))
        }
    }
}

/// Child side of the fork. Never returns.
///
/// # Safety
/// Call only in the child immediately after `fork`.
unsafe fn become_daemon(lock_fd: RawFd, operations_fd: RawFd, image: &ExecImage<'_>) -> ! {
    unsafe {
        if libc::setsid() < 0 {
            libc::_exit(CHILD_EXIT_SETSID);
        }

        let mut buf = [0u8; PID_DIGITS];
        let digits = format_pid(libc::getpid(), &mut buf);
        let written = libc::pwrite(lock_fd, digits.as_ptr().cast(), digits.len(), 0);
        if written != digits.len() as isize
            || libc::ftruncate(lock_fd, digits.len() as libc::off_t) < 0
            || libc::fsync(lock_fd) < 0
        {
            libc::_exit(CHILD_EXIT_RECORD_PID);
        }

        let flags = libc::fcntl(lock_fd, libc::F_GETFD);
        if flags < 0 || libc::fcntl(lock_fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
            libc::_exit(CHILD_EXIT_INHERIT_LOCK);
        }

        libc::close(operations_fd);

        if redirect_stdio_to_null() < 0 {
            libc::_exit(CHILD_EXIT_REDIRECT_STDIO);
        }

        let _ = image.exec();
        libc::_exit(CHILD_EXIT_EXEC);
    }
}

/// Points stdin, stdout and stderr at `/dev/null`. Returns -1 on failure.
unsafe fn redirect_stdio_to_null() -> libc::c_int {
    unsafe {
        let null = libc::open(c"/dev/null".as_ptr(), libc::O_RDWR);
        if null < 0 {
            return -1;
        }
        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(null, target) < 0 {
                return -1;
            }
        }
        if null > libc::STDERR_FILENO {
            libc::close(null);
        }
        0
    }
}
