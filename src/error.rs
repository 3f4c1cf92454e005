// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Typed errors returned by the session API.

use std::time::Duration;

use crate::lsp::state::SessionState;

/// Convenience alias for results produced by the session layer.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Everything that can go wrong while driving a language server session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport could not be established. Fatal to `start`.
    #[error("failed to connect to {network} endpoint {address}: {source}")]
    Dial {
        /// Network kind that was dialed.
        network: String,
        /// Address that was dialed.
        address: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// An operation was attempted before `start`.
    #[error("session has not been started")]
    NotStarted,

    /// An operation other than the handshake was attempted before the
    /// session became ready.
    #[error("session is not ready (state: {state})")]
    NotReady {
        /// State observed when the operation was rejected.
        state: SessionState,
    },

    /// The server answered a call with an error envelope.
    #[error("server returned error {code}: {message}")]
    Protocol {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable message from the server.
        message: String,
        /// Optional structured payload.
        data: Option<serde_json::Value>,
    },

    /// The caller cancelled the call before a response arrived.
    #[error("call '{method}' was cancelled")]
    CallAborted {
        /// Method of the aborted call.
        method: String,
    },

    /// The deadline for a call elapsed before a response arrived.
    #[error("call '{method}' timed out after {after:?}")]
    Timeout {
        /// Method of the timed-out call.
        method: String,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The session is shutting down, closed, or lost its connection.
    #[error("session is closed")]
    SessionClosed,

    /// Writing to the transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Parameters could not be serialized.
    #[error("failed to encode parameters for '{method}': {source}")]
    Encode {
        /// Method being encoded.
        method: String,
        /// Serializer failure.
        #[source]
        source: serde_json::Error,
    },

    /// A result could not be decoded into the expected shape.
    #[error("failed to decode result of '{method}': {source}")]
    Decode {
        /// Method whose result was decoded.
        method: String,
        /// Deserializer failure.
        #[source]
        source: serde_json::Error,
    },

    /// A document or workspace URI could not be parsed.
    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri {
        /// The rejected input.
        uri: String,
        /// Why the parser rejected it.
        reason: String,
    },
}

impl SessionError {
    /// Returns true for errors after which the session can keep being used.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Dial { .. } | Self::SessionClosed)
    }
}
