// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Request correlation and the dispatch loop.
pub mod engine;
/// Sinks for server-originated messages.
pub mod observer;
/// JSON-RPC message definitions and framing.
pub mod protocol;
/// LSP method names and parameter builders.
pub mod requests;
/// Session lifecycle and high-level operations.
pub mod session;
/// Lifecycle states.
pub mod state;
/// Socket dialing and framed message I/O.
pub mod transport;

pub use engine::{CallOptions, Engine};
pub use observer::{NoopObserver, Observer, PeerMessage, TracingObserver};
pub use requests::Identity;
pub use session::{Session, SessionConfig};
pub use state::SessionState;
pub use transport::{Endpoint, Network};
