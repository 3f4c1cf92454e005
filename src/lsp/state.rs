// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Session lifecycle states.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of a [`Session`](super::Session).
///
/// States only ever move forward:
/// `Unstarted → Started → Ready → ShuttingDown → Closed`.
/// `Ready` may be skipped when a session is shut down before its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, transport not yet dialed.
    Unstarted,
    /// Transport connected and dispatch loop running, handshake pending.
    Started,
    /// Handshake complete, all operations allowed.
    Ready,
    /// Shutdown in progress.
    ShuttingDown,
    /// Terminal. The session cannot be restarted.
    Closed,
}

impl SessionState {
    /// Lowercase name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Started => "started",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting_down",
            Self::Closed => "closed",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unstarted, Self::Started)
                | (Self::Started, Self::Ready)
                | (Self::Started | Self::Ready, Self::ShuttingDown)
                | (Self::ShuttingDown, Self::Closed)
        )
    }

    /// True once `start` has succeeded and before shutdown begins.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Started | Self::Ready)
    }

    /// True once shutdown has begun.
    #[must_use]
    pub const fn is_terminating(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SessionState; 5] = [
        SessionState::Unstarted,
        SessionState::Started,
        SessionState::Ready,
        SessionState::ShuttingDown,
        SessionState::Closed,
    ];

    #[test]
    fn test_transitions_only_move_forward() {
        for from in ALL {
            for to in ALL {
                if from.can_advance_to(to) {
                    assert!(from < to, "{from} -> {to} moves backwards");
                }
            }
        }
    }

    #[test]
    fn test_happy_path_is_legal() {
        assert!(SessionState::Unstarted.can_advance_to(SessionState::Started));
        assert!(SessionState::Started.can_advance_to(SessionState::Ready));
        assert!(SessionState::Ready.can_advance_to(SessionState::ShuttingDown));
        assert!(SessionState::ShuttingDown.can_advance_to(SessionState::Closed));
    }

    #[test]
    fn test_shutdown_before_handshake_is_legal() {
        assert!(SessionState::Started.can_advance_to(SessionState::ShuttingDown));
    }

    #[test]
    fn test_closed_is_terminal() {
        for to in ALL {
            assert!(!SessionState::Closed.can_advance_to(to));
        }
        assert!(!SessionState::Unstarted.can_advance_to(SessionState::ShuttingDown));
    }

    #[test]
    fn test_running_and_terminating_are_disjoint() {
        for state in ALL {
            assert!(!(state.is_running() && state.is_terminating()), "{state}");
        }
        assert!(SessionState::ShuttingDown.is_terminating());
        assert!(SessionState::Closed.is_terminating());
        assert!(!SessionState::Unstarted.is_terminating());
    }

    #[test]
    fn test_state_serializes_lowercase() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&SessionState::Ready)?, "\"ready\"");
        assert_eq!(SessionState::ShuttingDown.to_string(), "shutting_down");
        Ok(())
    }
}
