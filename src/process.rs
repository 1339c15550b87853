//! Liveness probe and termination signalling.
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tracing::debug;

use crate::error::ServiceError;

/// Whether a process id still refers to a live process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The process exists and may be signalled.
    Alive,
    /// No such process.
    Gone,
}

fn deliver(pid: i32, sig: Option<Signal>) -> Result<Liveness, ServiceError> {
    match signal::kill(Pid::from_raw(pid), sig) {
        Ok(()) => Ok(Liveness::Alive),
        Err(Errno::ESRCH) => {
            debug!("PID {pid} no longer exists");
            Ok(Liveness::Gone)
        }
        Err(errno) => Err(ServiceError::signal_denied(pid, sig, errno)),
    }
}

/// Sends the no-op signal to test whether `pid` exists.
pub fn probe(pid: i32) -> Result<Liveness, ServiceError> {
    deliver(pid, None)
}

/// Sends SIGTERM. A process that already exited counts as success.
pub fn terminate(pid: i32) -> Result<Liveness, ServiceError> {
    deliver(pid, Some(Signal::SIGTERM))
}
