// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Sinks for messages the server sends on its own initiative.

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::protocol::RequestId;

/// A request or notification originated by the server.
#[derive(Debug, Clone)]
pub struct PeerMessage {
    /// Method name, e.g. `window/logMessage`.
    pub method: String,
    /// Present when the server expects a reply.
    pub id: Option<RequestId>,
    /// Raw, undecoded parameters.
    pub params: Value,
}

impl PeerMessage {
    /// The `message` field of the params, when the server sent one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.params.get("message").and_then(Value::as_str)
    }

    /// Whether the server is waiting for a reply.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        self.id.is_some()
    }
}

/// Receives every peer-originated message of a session.
///
/// Called from a dedicated task, never from the dispatch loop itself, so a
/// slow sink delays other observations but never response correlation.
/// Returned errors are logged and dropped.
pub trait Observer: Send + Sync {
    /// Handles one message.
    ///
    /// # Errors
    ///
    /// Any error is logged by the session and otherwise ignored.
    fn observe(&self, message: &PeerMessage) -> anyhow::Result<()>;
}

/// Forwards peer messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, message: &PeerMessage) -> anyhow::Result<()> {
        let text = message.message().unwrap_or_default();

        match message.method.as_str() {
            "window/logMessage" | "window/showMessage" => {
                // MessageType: 1 = Error, 2 = Warning, 3 = Info, 4 = Log
                match message.params.get("type").and_then(Value::as_u64) {
                    Some(1) => error!(method = %message.method, "{}", text),
                    Some(2) => warn!(method = %message.method, "{}", text),
                    Some(3) => info!(method = %message.method, "{}", text),
                    _ => debug!(method = %message.method, "{}", text),
                }
            }
            method => {
                debug!(
                    method = method,
                    id = ?message.id,
                    "Server message: {}",
                    if text.is_empty() { "<no message>" } else { text }
                );
            }
        }

        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn observe(&self, _message: &PeerMessage) -> anyhow::Result<()> {
        Ok(())
    }
}
