// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for the `hawser` command-line driver.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Output, Stdio};

/// A mockls process listening on an ephemeral port.
struct MockServer {
    child: Child,
    stdout: BufReader<ChildStdout>,
    address: String,
}

impl MockServer {
    fn spawn() -> Result<Self> {
        let mut child = Command::new(env!("CARGO_BIN_EXE_mockls"))
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("Failed to spawn mockls")?;

        let mut stdout = BufReader::new(child.stdout.take().context("Failed to get stdout")?);
        let mut line = String::new();
        stdout.read_line(&mut line)?;
        let address = line
            .trim()
            .strip_prefix("listening ")
            .with_context(|| format!("Unexpected first line: {line:?}"))?
            .to_string();

        Ok(Self {
            child,
            stdout,
            address,
        })
    }

    fn finish(mut self) -> Result<Vec<String>> {
        self.child.wait()?;
        let mut events = Vec::new();
        for line in (&mut self.stdout).lines() {
            events.push(line?);
        }
        Ok(events)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

/// Runs `hawser` isolated from any user-level config.
fn hawser(config_home: &Path, args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_hawser"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env("RUST_LOG", "hawser=debug")
        .stdin(Stdio::null())
        .output()
        .context("Failed to run hawser")
}

#[test]
fn test_probe_reports_server_identity() -> Result<()> {
    let home = tempfile::tempdir()?;
    let server = MockServer::spawn()?;

    let output = hawser(home.path(), &["--address", &server.address, "probe"])?;
    assert!(
        output.status.success(),
        "probe failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: Value =
        serde_json::from_slice(&output.stdout).context("probe output is not JSON")?;
    assert_eq!(report["name"], "mockls");
    assert_eq!(report["capabilities"]["hoverProvider"], true);

    let events = server.finish()?;
    assert!(events.contains(&"notify exit".to_string()), "events: {events:?}");
    assert_eq!(events.last().map(String::as_str), Some("closed"));
    Ok(())
}

#[test]
fn test_run_script() -> Result<()> {
    let home = tempfile::tempdir()?;
    let workspace = tempfile::tempdir()?;
    let file = workspace.path().join("words.txt");
    std::fs::write(&file, "alpha beta\nalpha")?;
    let file = file.to_str().context("non-UTF-8 temp path")?;

    let server = MockServer::spawn()?;
    let output = hawser(
        home.path(),
        &[
            "--address",
            &server.address,
            "--workspace-uri",
            "file:///ws",
            "run",
            "--open",
            &format!("{file}:plaintext"),
            "--exec",
            r#"echo={"x":1}"#,
            "--complete",
            "words.txt:1:1",
            "--hover",
            "words.txt:1:8",
        ],
    )?;
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[..4], [
        "opened file:///ws/words.txt (plaintext)",
        r#"echo: {"x":1}"#,
        "alpha",
        "beta",
    ]);
    assert!(lines.get(4).is_some_and(|l| l.contains("beta")), "stdout: {stdout}");

    let events = server.finish()?;
    let order: Vec<&str> = events
        .iter()
        .filter(|e| e.starts_with("notify textDocument/"))
        .map(String::as_str)
        .collect();
    assert_eq!(
        order,
        ["notify textDocument/didOpen", "notify textDocument/didSave"]
    );
    Ok(())
}

#[test]
fn test_command_error_exits_nonzero_after_shutdown() -> Result<()> {
    let home = tempfile::tempdir()?;
    let server = MockServer::spawn()?;

    let output = hawser(
        home.path(),
        &["--address", &server.address, "run", "--exec", "no-such-command"],
    )?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown command"), "stderr: {stderr}");

    // The session is still shut down politely.
    let events = server.finish()?;
    assert!(events.contains(&"request shutdown".to_string()), "events: {events:?}");
    Ok(())
}

#[test]
fn test_unreachable_server_fails() -> Result<()> {
    let home = tempfile::tempdir()?;
    let address = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.to_string()
    };

    let output = hawser(home.path(), &["--address", &address, "probe"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to connect"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn test_bad_position_is_rejected() -> Result<()> {
    let home = tempfile::tempdir()?;
    let server = MockServer::spawn()?;

    let output = hawser(
        home.path(),
        &["--address", &server.address, "run", "--complete", "words.txt:1"],
    )?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Expected FILE:LINE:COL"), "stderr: {stderr}");
    Ok(())
}
