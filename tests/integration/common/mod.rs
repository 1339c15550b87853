#![allow(dead_code)]

use std::{
    fs,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use solod::{
    config::ServiceConfig,
    exec::AmbientEnv,
    service::SelfDaemonizedService,
};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Builds a service whose lock files live inside `dir`.
pub fn service_in(
    dir: &Path,
    name: &str,
    executable: &str,
    args: &[&str],
) -> SelfDaemonizedService {
    let config = ServiceConfig::new(name, executable)
        .with_arguments(args.iter().copied())
        .with_lock_file(dir.join(format!("{name}-service.lock")))
        .with_operations_lock_file(dir.join(format!("{name}.ops.lock")));
    SelfDaemonizedService::with_context(config, Some(dir), AmbientEnv::capture())
}

/// A service that sleeps long enough to outlive any test.
pub fn sleeper(dir: &Path, name: &str) -> SelfDaemonizedService {
    service_in(dir, name, "/bin/sleep", &["30"])
}

/// Kills and reaps a forked daemon when dropped, so failed assertions do not leak it.
///
/// Does nothing once the test has reaped the pid itself; an unreaped child pid cannot be
/// recycled, so the kill never hits an unrelated process.
pub struct DaemonGuard(pub i32);

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let mut status = 0;
        let result = unsafe { libc::waitpid(self.0, &mut status, libc::WNOHANG) };
        if result == 0 {
            unsafe {
                libc::kill(self.0, libc::SIGKILL);
            }
            reap(self.0);
        }
    }
}

/// Waits for a daemon forked by this test process and returns its raw wait status.
pub fn reap(pid: i32) -> Option<i32> {
    let mut status = 0;
    let result = unsafe { libc::waitpid(pid, &mut status, 0) };
    if result == pid { Some(status) } else { None }
}

pub fn read_lock(path: &Path) -> String {
    fs::read_to_string(path).expect("read lock file")
}

/// Waits until the process image of `pid` has been replaced by one whose command line
/// contains `needle`.
#[cfg(target_os = "linux")]
pub fn wait_for_exec(pid: i32, needle: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    let cmdline = format!("/proc/{pid}/cmdline");
    loop {
        if let Ok(raw) = fs::read(&cmdline) {
            let text = String::from_utf8_lossy(&raw).replace('\0', " ");
            if text.contains(needle) {
                return;
            }
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for PID {pid} to exec '{needle}'");
        }

        thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wait_for_exec(_pid: i32, _needle: &str) {
    thread::sleep(Duration::from_millis(500));
}

pub fn wait_for_file_value(path: &Path, expected: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(content) = fs::read_to_string(path)
            && content.trim() == expected
        {
            return;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for value '{}' in {:?}", expected, path);
        }

        thread::sleep(Duration::from_millis(50));
    }
}

pub fn is_process_alive(pid: i32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system.process(Pid::from_u32(pid as u32)).is_some()
}
