#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use predicates::boolean::PredicateBooleanExt;
use predicates::str::contains;
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use common::wait_for_exec;
use solod::{
    config::load_config,
    service::{SelfDaemonizedService, Status},
};
use tempfile::tempdir;

fn write_config(dir: &Path, name: &str) -> PathBuf {
    let config_path = dir.join("solod.yaml");
    fs::write(
        &config_path,
        format!(
            r#"
name: {name}
display_name: "CLI {name}"
executable: /bin/sleep
arguments: ["30"]
lock_file: {lock}
operations_lock_file: {ops}
"#,
            lock = dir.join(format!("{name}-service.lock")).display(),
            ops = dir.join(format!("{name}.ops.lock")).display(),
        ),
    )
    .unwrap();
    config_path
}

fn solo(dir: &Path, config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("solo"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn control_commands_drive_the_daemon() {
    let temp = tempdir().unwrap();
    let dir = temp.path();
    let config = write_config(dir, "clitest");

    solo(dir, &config)
        .arg("install")
        .assert()
        .success()
        .stdout(contains("Installed CLI clitest"));

    solo(dir, &config)
        .arg("install")
        .assert()
        .code(1)
        .stderr(contains("already installed"));

    solo(dir, &config)
        .arg("status")
        .assert()
        .code(3)
        .stdout(contains("stopped"));

    solo(dir, &config)
        .arg("start")
        .assert()
        .success()
        .stdout(contains("Started CLI clitest"));

    solo(dir, &config)
        .arg("start")
        .assert()
        .code(1)
        .stderr(contains("already running"));

    let output = solo(dir, &config)
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let payload: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(payload["status"].as_str(), Some("running"));
    let pid = payload["pid"].as_i64().expect("pid present") as i32;
    assert!(common::is_process_alive(pid));

    solo(dir, &config)
        .arg("restart")
        .assert()
        .success()
        .stdout(contains("Restarted").and(contains("PID")));

    solo(dir, &config)
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("Stopped CLI clitest"));

    solo(dir, &config)
        .arg("status")
        .assert()
        .code(3)
        .stdout(contains("stopped"));

    let lock = fs::read_to_string(dir.join("clitest-service.lock")).unwrap();
    assert_eq!(lock, "");

    solo(dir, &config).arg("uninstall").assert().success();
    solo(dir, &config)
        .arg("uninstall")
        .assert()
        .code(1)
        .stderr(contains("not installed"));
}

#[test]
fn failures_are_reported_once() {
    let temp = tempdir().unwrap();
    let dir = temp.path();
    let config = write_config(dir, "once");

    let output = solo(dir, &config).arg("uninstall").output().unwrap();
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("not installed").count(), 1, "stderr: {stderr}");
    assert!(stderr.starts_with("Error: "));
}

#[test]
fn missing_config_fails() {
    let temp = tempdir().unwrap();
    let dir = temp.path();

    solo(dir, &dir.join("absent.yaml"))
        .arg("status")
        .assert()
        .code(1)
        .stderr(contains("Failed to read config file"));
}

#[test]
fn run_holds_the_lock_in_the_foreground() {
    let temp = tempdir().unwrap();
    let dir = temp.path();
    let config_path = write_config(dir, "foreground");

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin!("solo"))
        .current_dir(dir)
        .env("HOME", dir)
        .arg("--config")
        .arg(&config_path)
        .arg("run")
        .spawn()
        .unwrap();
    let pid = child.id() as i32;
    wait_for_exec(pid, "sleep");

    let service = SelfDaemonizedService::new(load_config(&config_path).unwrap());
    let deadline = Instant::now() + Duration::from_secs(5);
    while service.status() != Status::Running {
        assert!(Instant::now() < deadline, "run never reported running");
        thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(service.status_report().pid, Some(pid));

    let err = service.start().unwrap_err();
    assert!(err.is_already_running());

    service.stop().unwrap();
    let status = child.wait().unwrap();
    assert!(!status.success());
    assert_eq!(service.status(), Status::Stopped);
}
