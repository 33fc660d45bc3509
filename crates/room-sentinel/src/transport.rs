//! Call-transport contract.
//!
//! The media engine is an opaque external capability. This module defines the
//! seam the session controller drives: imperative `join`/`leave`/`counts`
//! calls on [`CallTransport`], with asynchronous completions and participant
//! departures delivered on an `mpsc` stream of [`TransportEvent`].
//!
//! Events are assumed to be raised serially and delivered in order; the
//! controller guards every transition with a phase check rather than
//! reordering anything.

use secrecy::SecretString;

use crate::errors::SentinelError;

/// Live participant counts as the engine sees them.
///
/// Transient: fetched on demand, never cached by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantCounts {
    /// Participants currently present, including the bot itself.
    pub present: u64,
}

/// Asynchronous notifications from the call engine.
///
/// Completion events mirror the engine's callback convention: `error` is
/// `None` on success and carries the engine's diagnostic detail otherwise.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The join issued earlier has completed.
    JoinCompleted { error: Option<String> },

    /// The leave issued earlier has completed.
    LeaveCompleted { error: Option<String> },

    /// A participant (other than the bot) left the call.
    ParticipantLeft { participant: String, reason: String },
}

/// The call-engine capability the session controller drives.
///
/// `join` and `leave` only *issue* the operation; the matching
/// `JoinCompleted` / `LeaveCompleted` event arrives later on the event
/// stream handed out alongside the transport.
pub trait CallTransport: Send {
    /// Issue an asynchronous join for `room_url` using `meeting_token`.
    ///
    /// # Errors
    ///
    /// `SentinelError::Transport` if the command cannot be issued (the
    /// completion outcome itself arrives as an event).
    fn join(&mut self, room_url: &str, meeting_token: &SecretString)
        -> Result<(), SentinelError>;

    /// Issue an asynchronous leave.
    ///
    /// # Errors
    ///
    /// `SentinelError::Transport` if the command cannot be issued.
    fn leave(&mut self) -> Result<(), SentinelError>;

    /// Current live participant counts.
    fn participant_counts(&self) -> ParticipantCounts;
}
