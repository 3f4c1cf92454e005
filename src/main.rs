// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Hawser command-line driver.
//!
//! Connects to a language server listening on a socket, performs the
//! handshake and runs a scripted sequence of document and query operations.

#![allow(clippy::print_stdout, reason = "CLI tool needs to output to stdout")]

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hawser_lsp::config::Config;
use hawser_lsp::{Network, Session, TracingObserver};

/// Command-line arguments for Hawser.
#[derive(Parser, Debug)]
#[command(name = "hawser")]
#[command(about = "Drive a language server over a TCP or Unix socket")]
#[command(version = env!("HAWSER_VERSION"))]
struct Args {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Socket kind: tcp or unix. Overrides the config file.
    #[arg(long, global = true)]
    network: Option<Network>,

    /// Server address (`host:port` or socket path). Overrides the config file.
    #[arg(long, global = true)]
    address: Option<String>,

    /// Workspace folder name announced in the handshake.
    #[arg(long, global = true)]
    workspace_name: Option<String>,

    /// Workspace folder URI announced in the handshake.
    #[arg(long, global = true)]
    workspace_uri: Option<String>,

    /// Per-request timeout in seconds (0 to disable).
    #[arg(long, global = true)]
    request_timeout: Option<u64>,
}

/// Subcommands supported by Hawser.
#[derive(Subcommand, Debug)]
enum Command {
    /// Handshake, print the server identity and capabilities, then shut down.
    Probe,

    /// Handshake, then open, execute and query as requested.
    Run {
        /// Open and save a file, `PATH[:LANG]`. Repeatable.
        #[arg(long = "open", value_name = "PATH[:LANG]")]
        open: Vec<String>,

        /// Execute a server command, `COMMAND[=JSON]`. Repeatable.
        #[arg(long = "exec", value_name = "COMMAND[=JSON]")]
        exec: Vec<String>,

        /// Query completion at a one-based position, `FILE:LINE:COL`. Repeatable.
        #[arg(long = "complete", value_name = "FILE:LINE:COL")]
        complete: Vec<String>,

        /// Query hover at a one-based position, `FILE:LINE:COL`. Repeatable.
        #[arg(long = "hover", value_name = "FILE:LINE:COL")]
        hover: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hawser=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    let session = Session::new(config.session_config(), Arc::new(TracingObserver));

    session.start().await?;

    // Once connected, always attempt a clean shutdown, even if a step failed.
    let outcome = async {
        session
            .handshake(&config.identity)
            .await
            .context("Handshake failed")?;

        match &args.command {
            Command::Probe => probe(&session).await,
            Command::Run {
                open,
                exec,
                complete,
                hover,
            } => run_script(&session, &config, open, exec, complete, hover).await,
        }
    }
    .await;

    if let Err(e) = session.shutdown().await {
        warn!("Shutdown failed: {}", e);
    }

    outcome
}

/// Loads the layered configuration and applies command-line overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.clone())?;

    if let Some(network) = args.network {
        config.endpoint.network = network;
    }
    if let Some(address) = &args.address {
        config.endpoint.address.clone_from(address);
    }
    if let Some(name) = &args.workspace_name {
        config.identity.workspace_name.clone_from(name);
    }
    if let Some(uri) = &args.workspace_uri {
        config.identity.workspace_uri = uri.trim_end_matches('/').to_string();
    }
    if let Some(timeout) = args.request_timeout {
        config.request_timeout = timeout;
    }

    info!(
        "Endpoint: {} {}",
        config.endpoint.network, config.endpoint.address
    );
    Ok(config)
}

async fn probe(session: &Session) -> Result<()> {
    let server = session.server_info().await;
    let capabilities = session.capabilities().await;

    let report = json!({
        "name": server.as_ref().map(|s| s.name.clone()),
        "version": server.and_then(|s| s.version),
        "capabilities": capabilities,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_script(
    session: &Session,
    config: &Config,
    open: &[String],
    exec: &[String],
    complete: &[String],
    hover: &[String],
) -> Result<()> {
    let workspace = &config.identity.workspace_uri;

    for spec in open {
        let (path, language) = parse_open(spec);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let uri = document_uri(workspace, &path)?;

        session.open_document(&uri, &language, &text).await?;
        session.save_document(&uri, &text).await?;
        println!("opened {uri} ({language})");
    }

    for spec in exec {
        let (command, arguments) = parse_exec(spec)?;
        let result = session.execute_command(&command, arguments).await?;
        println!("{command}: {result}");
    }

    for spec in complete {
        let (file, line, character) = parse_position(spec)?;
        let uri = document_uri(workspace, Path::new(&file))?;
        for item in session.query_completion(&uri, line, character).await? {
            println!("{}", item.label);
        }
    }

    for spec in hover {
        let (file, line, character) = parse_position(spec)?;
        let uri = document_uri(workspace, Path::new(&file))?;
        match session.hover(&uri, line, character).await? {
            Some(h) => println!("{}", serde_json::to_string(&h.contents)?),
            None => println!("(no hover)"),
        }
    }

    Ok(())
}

/// Splits `PATH[:LANG]`. Without a language, the file extension is used.
fn parse_open(spec: &str) -> (PathBuf, String) {
    if let Some((path, lang)) = spec.rsplit_once(':')
        && !path.is_empty()
        && !lang.is_empty()
        && !lang.contains(['/', '\\'])
    {
        return (PathBuf::from(path), lang.to_string());
    }

    let path = PathBuf::from(spec);
    let language = path
        .extension()
        .map_or_else(|| "plaintext".to_string(), |e| e.to_string_lossy().into_owned());
    (path, language)
}

/// Splits `COMMAND[=JSON]`. A missing or `{}` argument sends no arguments.
fn parse_exec(spec: &str) -> Result<(String, Vec<Value>)> {
    let Some((command, raw)) = spec.split_once('=') else {
        return Ok((spec.to_string(), Vec::new()));
    };

    let argument: Value = serde_json::from_str(raw)
        .with_context(|| format!("Invalid JSON argument for command '{command}'"))?;

    let arguments = match argument {
        Value::Object(map) if map.is_empty() => Vec::new(),
        other => vec![other],
    };
    Ok((command.to_string(), arguments))
}

/// Splits `FILE:LINE:COL` with one-based line and column into a zero-based
/// protocol position.
fn parse_position(spec: &str) -> Result<(String, u32, u32)> {
    let mut parts = spec.rsplitn(3, ':');
    let (Some(col), Some(line), Some(file)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(anyhow!("Invalid position '{spec}'. Expected FILE:LINE:COL"));
    };

    let line: u32 = line
        .parse()
        .with_context(|| format!("Invalid line in '{spec}'"))?;
    let col: u32 = col
        .parse()
        .with_context(|| format!("Invalid column in '{spec}'"))?;

    Ok((file.to_string(), line.saturating_sub(1), col.saturating_sub(1)))
}

/// URI of a file as seen by the server: its name under the workspace URI.
fn document_uri(workspace: &str, path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .with_context(|| format!("No file name in {}", path.display()))?
        .to_string_lossy();
    let base = url::Url::parse(&format!("{}/", workspace.trim_end_matches('/')))
        .with_context(|| format!("Invalid workspace URI '{workspace}'"))?;
    let uri = base
        .join(&name)
        .with_context(|| format!("Cannot place {name} under {workspace}"))?;
    Ok(uri.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_open() {
        assert_eq!(
            parse_open("notes.txt:markdown"),
            (PathBuf::from("notes.txt"), "markdown".to_string())
        );
        assert_eq!(
            parse_open("src/lib.rs"),
            (PathBuf::from("src/lib.rs"), "rs".to_string())
        );
        assert_eq!(
            parse_open("README"),
            (PathBuf::from("README"), "plaintext".to_string())
        );
    }

    #[test]
    fn test_parse_exec() -> Result<()> {
        assert_eq!(parse_exec("reload")?, ("reload".to_string(), vec![]));
        assert_eq!(parse_exec("echo={}")?, ("echo".to_string(), vec![]));
        assert_eq!(
            parse_exec(r#"echo={"x":1}"#)?,
            ("echo".to_string(), vec![json!({"x": 1})])
        );
        assert!(parse_exec("echo={oops").is_err());
        Ok(())
    }

    #[test]
    fn test_parse_position() -> Result<()> {
        assert_eq!(parse_position("a.txt:3:5")?, ("a.txt".to_string(), 2, 4));
        assert_eq!(parse_position("a.txt:1:1")?, ("a.txt".to_string(), 0, 0));
        assert!(parse_position("a.txt:3").is_err());
        assert!(parse_position("a.txt:x:1").is_err());
        Ok(())
    }

    #[test]
    fn test_document_uri() -> Result<()> {
        assert_eq!(
            document_uri("file:///ws", Path::new("/tmp/some dir/a.txt"))?,
            "file:///ws/a.txt"
        );
        assert_eq!(
            document_uri("file:///ws/", Path::new("b c.rs"))?,
            "file:///ws/b%20c.rs"
        );
        Ok(())
    }
}
