//! End-to-end checks of the `iodemo-launch` binary that need no remote
//! hosts.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;

const DEADLINE: Duration = Duration::from_secs(10);

fn iodemo_launch() -> Command {
    Command::cargo_bin("iodemo-launch").unwrap()
}

fn with_required_args(cmd: &mut Command) -> &mut Command {
    cmd.args([
        "--client_host",
        "client-node",
        "--server_host",
        "server-node",
        "--client_cmd",
        "io_demo",
        "--server_cmd",
        "io_demo",
    ])
}

#[test]
fn help_lists_legacy_flags() {
    iodemo_launch()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--client_host")
                .and(predicate::str::contains("--server_host"))
                .and(predicate::str::contains("--client_cmd"))
                .and(predicate::str::contains("--server_cmd")),
        );
}

#[test]
fn help_explains_where_logs_land() {
    let output = iodemo_launch().arg("--help").output().unwrap();
    assert!(output.status.success());
    let help = String::from_utf8(output.stdout).unwrap();
    let help = help.split_whitespace().collect::<Vec<_>>().join(" ");
    assert!(
        help.contains("relative --client-log/--server-log paths resolve against it"),
        "{help}"
    );
    assert!(help.contains("Client output file, relative to --work-dir"), "{help}");
}

#[test]
fn missing_hosts_is_a_usage_error() {
    iodemo_launch()
        .args(["--client_cmd", "io_demo"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--client_host"));
}

#[test]
fn unreadable_config_fails_before_launching() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    let mut cmd = iodemo_launch();
    with_required_args(&mut cmd)
        .arg("--config")
        .arg(&missing)
        .current_dir(dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("failed to read config file"));

    assert!(!dir.path().join("io_demo_client.out").exists());
}

#[test]
fn port_in_use_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port().to_string();

    let mut cmd = iodemo_launch();
    with_required_args(&mut cmd)
        .args(["--bind-ip", "127.0.0.1", "--port", &port, "--local"])
        .current_dir(dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("failed to bind rendezvous socket"));
}

#[test]
fn absent_peer_times_out_with_distinct_error() {
    let dir = tempfile::tempdir().unwrap();

    // `true` exits at once without ever connecting back.
    iodemo_launch()
        .args([
            "--client_host",
            "localhost",
            "--server_host",
            "localhost",
            "--client_cmd",
            "true",
            "--server_cmd",
            "true",
            "--local",
            "--bind-ip",
            "127.0.0.1",
            "--port",
            "0",
            "--settle-delay-ms",
            "0",
            "--accept-timeout",
            "1",
        ])
        .current_dir(dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::starts_with("127.0.0.1:"))
        .stderr(predicate::str::contains("waiting for client to connect"));

    // The client side ran and its env file was cleaned up.
    assert!(dir.path().join("io_demo_client.out").exists());
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".iodemo-env-"))
        .collect();
    assert!(leftovers.is_empty(), "env files left behind: {leftovers:?}");
    assert!(!dir.path().join("io_demo_server.out").exists());
}

/// Spawn the launcher on this machine with an ephemeral loopback port and
/// return it together with the address it printed.
fn spawn_local(dir: &Path, client_cmd: &str, server_cmd: &str) -> (Child, String) {
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("iodemo-launch"))
        .args([
            "--client_host",
            "localhost",
            "--server_host",
            "localhost",
            "--client_cmd",
            client_cmd,
            "--server_cmd",
            server_cmd,
            "--local",
            "--bind-ip",
            "127.0.0.1",
            "--port",
            "0",
            "--settle-delay-ms",
            "0",
        ])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let mut line = String::new();
    BufReader::new(child.stdout.take().unwrap())
        .read_line(&mut line)
        .unwrap();
    (child, line.trim().to_string())
}

/// A side that reports its arguments, then idles until SIGTERM and leaves
/// `<name>.term` behind in its working directory.
fn trapping_cmd(name: &str) -> String {
    format!(
        "run() {{ echo \"{name} $*\"; sleep 30 & wait; }}; \
         trap 'echo term > {name}.term; exit 0' TERM; run"
    )
}

fn wait_for_content(path: &Path, needle: &str) {
    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Ok(content) = std::fs::read_to_string(path) {
            if content.contains(needle) {
                return;
            }
        }
        assert!(Instant::now() < deadline, "{} never contained {needle:?}", path.display());
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn wait_exit(child: &mut Child) -> ExitStatus {
    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("launcher did not exit");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn env_files_in(dir: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".iodemo-env-"))
        .map(|e| e.path())
        .collect()
}

#[cfg(unix)]
#[test]
fn successful_rendezvous_signals_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let (mut launcher, address) =
        spawn_local(dir.path(), &trapping_cmd("client"), &trapping_cmd("server"));
    assert!(address.starts_with("127.0.0.1:"), "{address}");

    // This test plays both peers, connecting once each side is up.
    wait_for_content(&dir.path().join("io_demo_client.out"), &format!("client -f {address}"));
    let _client = std::net::TcpStream::connect(&address).unwrap();
    wait_for_content(&dir.path().join("io_demo_server.out"), &format!("server -f {address}"));
    let _server = std::net::TcpStream::connect(&address).unwrap();

    let status = wait_exit(&mut launcher);
    assert!(status.success(), "launcher failed: {status}");

    wait_for_content(&dir.path().join("client.term"), "term");
    wait_for_content(&dir.path().join("server.term"), "term");
    let leftovers = env_files_in(dir.path());
    assert!(leftovers.is_empty(), "env files left behind: {leftovers:?}");
}

#[cfg(unix)]
#[test]
fn sigterm_cleans_up_launched_client() {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let dir = tempfile::tempdir().unwrap();
    let (mut launcher, address) =
        spawn_local(dir.path(), &trapping_cmd("client"), &trapping_cmd("server"));

    // Client is up and the launcher is blocked waiting for it to connect.
    wait_for_content(&dir.path().join("io_demo_client.out"), &format!("client -f {address}"));
    assert_eq!(env_files_in(dir.path()).len(), 1);

    kill(Pid::from_raw(launcher.id() as i32), Signal::SIGTERM).unwrap();
    let status = wait_exit(&mut launcher);
    assert!(!status.success());

    let mut stderr = String::new();
    launcher.stderr.take().unwrap().read_to_string(&mut stderr).unwrap();
    assert!(stderr.contains("Interrupted by SIGTERM"), "{stderr}");

    wait_for_content(&dir.path().join("client.term"), "term");
    let leftovers = env_files_in(dir.path());
    assert!(leftovers.is_empty(), "env files left behind: {leftovers:?}");
    assert!(!dir.path().join("io_demo_server.out").exists());
}
