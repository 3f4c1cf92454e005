// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for configuration loading and merging.
//!
//! Verifies that Hawser loads settings from files, environment variables
//! and CLI arguments in the correct priority order.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

use hawser_lsp::Network;
use hawser_lsp::config::Config;

fn write_config(dir: &Path, contents: &str) -> Result<std::path::PathBuf> {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).context("Failed to write config file")?;
    Ok(path)
}

/// An address nothing listens on.
fn dead_address() -> Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.to_string())
}

/// Spawns mockls and returns it with its listening address.
fn spawn_mockls() -> Result<(Child, String)> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_mockls"))
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .context("Failed to spawn mockls")?;

    let mut line = String::new();
    BufReader::new(child.stdout.take().context("Failed to get stdout")?).read_line(&mut line)?;
    let address = line
        .trim()
        .strip_prefix("listening ")
        .with_context(|| format!("Unexpected first line: {line:?}"))?
        .to_string();
    Ok((child, address))
}

fn probe(config_home: &Path, config: &Path, env: &[(&str, &str)], args: &[&str]) -> Result<Output> {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hawser"));
    cmd.arg("--config").arg(config);
    cmd.args(args).arg("probe");
    // Isolate from user-level config
    cmd.env("XDG_CONFIG_HOME", config_home);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.output().context("Failed to run hawser")
}

#[test]
fn test_file_values_are_loaded() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_config(
        dir.path(),
        r#"
request_timeout = 12
shutdown_timeout = 2

[endpoint]
network = "unix"
address = "/tmp/hawser-test.sock"

[identity]
client_name = "editor"
workspace_name = "project"
workspace_uri = "file:///src/project"
"#,
    )?;

    let config = Config::load(Some(path))?;
    assert_eq!(config.request_timeout, 12);
    assert_eq!(config.endpoint.network, Network::Unix);
    assert_eq!(config.endpoint.address, "/tmp/hawser-test.sock");
    assert_eq!(config.identity.client_name, "editor");
    assert_eq!(config.identity.workspace_name, "project");
    assert_eq!(config.identity.workspace_uri, "file:///src/project");
    // Not in the file: default
    assert!(!config.identity.client_version.is_empty());

    let session = config.session_config();
    assert_eq!(session.request_timeout, Some(Duration::from_secs(12)));
    assert_eq!(session.shutdown_timeout, Duration::from_secs(2));
    Ok(())
}

#[test]
fn test_partial_file_keeps_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_config(dir.path(), "[endpoint]\naddress = \"10.0.0.5:7000\"\n")?;

    let config = Config::load(Some(path))?;
    assert_eq!(config.endpoint.network, Network::Tcp);
    assert_eq!(config.endpoint.address, "10.0.0.5:7000");
    assert!(config.identity.workspace_uri.starts_with("file:///"));
    Ok(())
}

#[test]
fn test_invalid_file_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_config(dir.path(), "request_timeout = \"soon\"\n")?;

    let err = Config::load(Some(path))
        .err()
        .context("expected a deserialization error")?;
    assert!(
        format!("{err:#}").contains("Failed to deserialize configuration"),
        "got {err:#}"
    );
    Ok(())
}

#[test]
fn test_environment_overrides_file() -> Result<()> {
    let home = tempfile::tempdir()?;
    let path = write_config(
        home.path(),
        &format!("[endpoint]\naddress = \"{}\"\n", dead_address()?),
    )?;

    let (mut server, address) = spawn_mockls()?;
    let output = probe(
        home.path(),
        &path,
        &[("HAWSER_ENDPOINT__ADDRESS", address.as_str())],
        &[],
    )?;
    let _ = server.kill();

    assert!(
        output.status.success(),
        "probe failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}

#[test]
fn test_cli_overrides_environment() -> Result<()> {
    let home = tempfile::tempdir()?;
    let path = write_config(home.path(), "request_timeout = 5\n")?;
    let dead = dead_address()?;

    let (mut server, address) = spawn_mockls()?;
    let output = probe(
        home.path(),
        &path,
        &[("HAWSER_ENDPOINT__ADDRESS", dead.as_str())],
        &["--address", &address],
    )?;
    let _ = server.kill();

    assert!(
        output.status.success(),
        "probe failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn test_user_config_directory_is_read() -> Result<()> {
    let home = tempfile::tempdir()?;
    let (mut server, address) = spawn_mockls()?;

    std::fs::create_dir_all(home.path().join("hawser"))?;
    write_config(
        &home.path().join("hawser"),
        &format!("[endpoint]\naddress = \"{address}\"\n"),
    )?;
    // Explicit file present but silent on the endpoint.
    let explicit = write_config(home.path(), "shutdown_timeout = 1\n")?;

    let output = probe(home.path(), &explicit, &[], &[])?;
    let _ = server.kill();

    assert!(
        output.status.success(),
        "probe failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}
