#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{
    DaemonGuard, read_lock, reap, service_in, sleeper, wait_for_exec, wait_for_file_value,
};
use solod::{
    config::ServiceConfig,
    exec::AmbientEnv,
    service::{SelfDaemonizedService, Status},
};
use tempfile::tempdir;

#[test]
fn start_records_daemon_pid_and_stop_clears_it() {
    let temp = tempdir().unwrap();
    let service = sleeper(temp.path(), "roundtrip");
    let lock_path = service.identity().lock_path.clone();

    let pid = service.start().unwrap();
    let _guard = DaemonGuard(pid);
    wait_for_exec(pid, "sleep");

    assert_eq!(read_lock(&lock_path).parse::<i32>().unwrap(), pid);
    assert_eq!(service.status(), Status::Running);
    assert_eq!(service.status_report().pid, Some(pid));

    service.stop().unwrap();
    assert_eq!(read_lock(&lock_path), "");
    assert_eq!(service.status(), Status::Stopped);

    let status = reap(pid).expect("daemon reaped");
    assert!(libc::WIFSIGNALED(status));
    assert_eq!(libc::WTERMSIG(status), libc::SIGTERM);
}

#[test]
fn stop_is_idempotent() {
    let temp = tempdir().unwrap();
    let service = sleeper(temp.path(), "idempotent");

    for _ in 0..3 {
        service.stop().unwrap();
    }

    let pid = service.start().unwrap();
    let _guard = DaemonGuard(pid);
    wait_for_exec(pid, "sleep");

    service.stop().unwrap();
    reap(pid);
    service.stop().unwrap();
    service.stop().unwrap();
    assert_eq!(service.status(), Status::Stopped);
}

#[test]
fn daemon_leads_its_own_session_with_null_stdio() {
    let temp = tempdir().unwrap();
    let service = sleeper(temp.path(), "session");

    let pid = service.start().unwrap();
    let _guard = DaemonGuard(pid);
    wait_for_exec(pid, "sleep");

    assert_eq!(unsafe { libc::getsid(pid) }, pid);
    assert_ne!(unsafe { libc::getsid(0) }, pid);

    #[cfg(target_os = "linux")]
    for fd in 0..3 {
        let target = fs::read_link(format!("/proc/{pid}/fd/{fd}")).unwrap();
        assert_eq!(target, std::path::PathBuf::from("/dev/null"));
    }

    service.stop().unwrap();
}

#[test]
fn daemon_receives_arguments_and_configured_environment() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("marker.txt");
    let script = format!(
        "echo \"$SOLOD_GREETING $1\" > {}; exec sleep 30",
        marker.display()
    );
    let config = ServiceConfig::new("environment", "/bin/sh")
        .with_arguments(["-c", script.as_str(), "sh", "world"])
        .with_env_var("SOLOD_GREETING", "hello")
        .with_lock_file(temp.path().join("environment-service.lock"))
        .with_operations_lock_file(temp.path().join("environment.ops.lock"));
    let ambient = AmbientEnv::from_pairs([
        ("SOLOD_GREETING", "ambient"),
        ("PATH", "/usr/bin:/bin"),
    ]);
    let service =
        SelfDaemonizedService::with_context(config, Some(temp.path()), ambient);

    let pid = service.start().unwrap();
    let _guard = DaemonGuard(pid);
    wait_for_file_value(&marker, "hello world");

    service.stop().unwrap();
}

#[test]
fn restart_replaces_the_daemon() {
    let temp = tempdir().unwrap();
    let service = sleeper(temp.path(), "restart");

    let first = service.start().unwrap();
    let _first_guard = DaemonGuard(first);
    wait_for_exec(first, "sleep");

    let second = service.restart().unwrap();
    let _second_guard = DaemonGuard(second);
    assert_ne!(first, second);
    reap(first);
    wait_for_exec(second, "sleep");

    assert_eq!(
        read_lock(&service.identity().lock_path)
            .parse::<i32>()
            .unwrap(),
        second
    );
    assert_eq!(service.status(), Status::Running);

    service.stop().unwrap();
}

#[test]
fn restart_of_stopped_service_just_starts() {
    let temp = tempdir().unwrap();
    let service = sleeper(temp.path(), "cold-restart");

    let pid = service.restart().unwrap();
    let _guard = DaemonGuard(pid);
    wait_for_exec(pid, "sleep");
    assert_eq!(service.status(), Status::Running);

    service.stop().unwrap();
}

#[test]
fn failed_exec_releases_the_lock() {
    let temp = tempdir().unwrap();
    let not_executable = temp.path().join("plain.txt");
    fs::write(&not_executable, "not a program").unwrap();
    let service =
        service_in(temp.path(), "noexec", not_executable.to_str().unwrap(), &[]);

    let pid = service.start().unwrap();
    let status = reap(pid).expect("child reaped");
    assert!(libc::WIFEXITED(status));
    assert_eq!(libc::WEXITSTATUS(status), solod::constants::CHILD_EXIT_EXEC);

    assert_eq!(service.status(), Status::Stopped);
    service.stop().unwrap();

    let again = service.start().unwrap();
    assert!(reap(again).is_some());
}
