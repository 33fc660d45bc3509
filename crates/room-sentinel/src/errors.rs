//! Sentinel error types.
//!
//! Every error here is fatal: the bot has no retry or recovery policy.
//! A failed run is cheap to restart externally, so each variant propagates
//! straight to `main`, which maps it to a process exit code.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Fatal errors for a sentinel run.
///
/// Exit code mapping (see [`SentinelError::exit_code`]):
/// - `Config`: 2 (bad invocation, no I/O performed)
/// - `PresenceTimeout`: 3 (nobody showed up; the API itself was healthy)
/// - everything else: 1
#[derive(Debug, Error)]
pub enum SentinelError {
    /// Invalid or missing configuration, surfaced before any network activity.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The control plane refused to mint a meeting token.
    #[error("Failed to mint meeting token: status {status}, body: {body}")]
    Credential { status: StatusCode, body: String },

    /// The presence endpoint returned a non-success status.
    #[error("Presence query failed: status {status}, body: {body}")]
    PresenceQuery { status: StatusCode, body: String },

    /// No participant satisfied the presence predicate within the deadline.
    #[error("Timed out after {waited:?} waiting for a participant to arrive")]
    PresenceTimeout { waited: Duration },

    /// The call engine reported a join failure.
    #[error("Failed to join room: {0}")]
    Join(String),

    /// Post-join participant count contradicts the pre-join presence
    /// guarantee. Signals a protocol inconsistency, not an environment
    /// failure.
    #[error("Expected at least 1 present participant after join, got {present}")]
    JoinInvariant { present: u64 },

    /// The call engine reported a leave failure.
    #[error("Failed to leave room: {0}")]
    Leave(String),

    /// The transport stopped servicing the session (engine exited, channel
    /// closed) before the lifecycle completed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Network-level HTTP failure talking to the control plane.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl SentinelError {
    /// Process exit code for this error.
    ///
    /// `PresenceTimeout` gets its own code so operators can tell "nobody
    /// showed up" apart from "the API is broken" without parsing logs.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            SentinelError::Config(_) => 2,
            SentinelError::PresenceTimeout { .. } => 3,
            SentinelError::Credential { .. }
            | SentinelError::PresenceQuery { .. }
            | SentinelError::Join(_)
            | SentinelError::JoinInvariant { .. }
            | SentinelError::Leave(_)
            | SentinelError::Transport(_)
            | SentinelError::Http(_) => 1,
        }
    }
}
