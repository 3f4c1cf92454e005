// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lsp::{Endpoint, Identity, SessionConfig};

/// Address dialed when nothing else is configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:9877";

/// Settings for the `hawser` driver, merged from every layer.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Per-request deadline in seconds, 0 disables it (default: 30)
    pub request_timeout: u64,

    /// Deadline for the graceful shutdown exchange in seconds (default: 5)
    pub shutdown_timeout: u64,

    /// Where the language server listens
    pub endpoint: Endpoint,

    /// Client and workspace announced during the handshake
    pub identity: Identity,
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the merged result does
    /// not deserialize.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let (workspace_name, workspace_uri) = workspace_of(&cwd);

        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("request_timeout", 30)?
            .set_default("shutdown_timeout", 5)?
            .set_default("endpoint.network", "tcp")?
            .set_default("endpoint.address", DEFAULT_ADDRESS)?
            .set_default("identity.client_name", "hawser")?
            .set_default("identity.client_version", env!("HAWSER_VERSION"))?
            .set_default("identity.workspace_name", workspace_name)?
            .set_default("identity.workspace_uri", workspace_uri)?;

        // 2. Load from user config directory (~/.config/hawser/config.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("hawser").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        // 3. Load from explicit file if provided
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Load from environment variables (HAWSER_REQUEST_TIMEOUT, HAWSER_ENDPOINT__ADDRESS, etc.)
        builder = builder.add_source(
            config::Environment::with_prefix("HAWSER")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Session settings derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::new(self.endpoint.clone());
        session.request_timeout = match self.request_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        session.shutdown_timeout = Duration::from_secs(self.shutdown_timeout);
        session
    }
}

/// Name and `file://` URI of a workspace directory.
#[must_use]
pub fn workspace_of(dir: &Path) -> (String, String) {
    let name = dir
        .file_name()
        .map_or_else(|| "workspace".to_string(), |n| n.to_string_lossy().into_owned());
    let uri = url::Url::from_directory_path(dir)
        .map_or_else(|()| "file:///".to_string(), |u| u.as_str().trim_end_matches('/').to_string());
    (name, uri)
}
