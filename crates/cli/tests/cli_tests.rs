//! CLI integration tests.
//!
//! Uses `assert_cmd` to spawn the `harbor` binary and check exit codes and
//! stderr for startup failures, plus one full run serving a single client.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Command as StdCommand, Stdio};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn harbor(dir: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_harbor"));
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

// ──────────────────────────────────────────────
// Help and startup failures
// ──────────────────────────────────────────────

#[test]
fn help_lists_flags() {
    let dir = TempDir::new().unwrap();
    harbor(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--once"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    harbor(&dir)
        .args(["--config", "nope.toml"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not read 'nope.toml'"));
}

#[test]
fn malformed_default_config_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("harbor.toml"), "[server]\nport = \"high\"\n").unwrap();
    harbor(&dir)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not parse 'harbor.toml'"));
}

#[test]
fn invalid_log_filter_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("harbor.toml"), "[log]\nfilter = \"harbor=loud\"\n").unwrap();
    harbor(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid log filter"));
}

#[test]
fn port_in_use_fails() {
    let dir = TempDir::new().unwrap();
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port().to_string();
    harbor(&dir)
        .args(["--port", &port, "--once"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot bind"));
}

// ──────────────────────────────────────────────
// Serving
// ──────────────────────────────────────────────

fn frame(body: &str) -> String {
    format!("Content-Length: {}\r\n\r\n{}", body.len(), body)
}

#[test]
fn once_serves_one_client_and_exits() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("harbor.log");
    let mut child = StdCommand::new(env!("CARGO_BIN_EXE_harbor"))
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .args(["--port", "0", "--once", "--log-file"])
        .arg(&log)
        .stdout(Stdio::piped())
        .spawn()
        .expect("harbor starts");

    let mut banner = String::new();
    BufReader::new(child.stdout.take().unwrap())
        .read_line(&mut banner)
        .unwrap();
    let addr = banner
        .trim()
        .strip_prefix("listening on ")
        .expect("address banner")
        .to_owned();

    let mut stream = TcpStream::connect(addr).unwrap();
    for body in [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"capabilities":{}}}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"shutdown"}"#,
        r#"{"jsonrpc":"2.0","method":"exit"}"#,
    ] {
        stream.write_all(frame(body).as_bytes()).unwrap();
    }

    let status = child.wait().unwrap();
    assert!(status.success());
    let logged = std::fs::read_to_string(&log).unwrap();
    assert!(logged.contains("server closed"), "{logged}");
}
