// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Hawser is a client for language servers reachable over a socket.
//!
//! It frames JSON-RPC messages, correlates concurrent requests with their
//! responses, and drives the LSP session lifecycle from connect through
//! handshake to shutdown.

/// Layered configuration for the driver and sessions.
pub mod config;
/// Error types shared by every session operation.
pub mod error;
/// LSP client session, transport and correlation engine.
pub mod lsp;

pub use error::{Result, SessionError};
pub use lsp::{
    CallOptions, Endpoint, Identity, Network, NoopObserver, Observer, PeerMessage, Session,
    SessionConfig, SessionState, TracingObserver,
};
