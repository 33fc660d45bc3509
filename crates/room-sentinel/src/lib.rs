//! Room sentinel: a standby participant for one conference room.
//!
//! For one process run the bot polls the room's control-plane presence
//! endpoint until a participant shows up, joins the call through an external
//! call-engine adapter, then watches departure events and leaves as soon as
//! it is the last participant remaining.
//!
//! The session lifecycle lives in [`controller`]; everything else is I/O
//! plumbing around it: [`resolver`] turns a room URL plus API key into a
//! joinable [`resolver::Room`], [`presence`] implements the admission wait,
//! [`transport`] defines the engine seam and [`engine`] bridges it to the
//! adapter process.

#![warn(clippy::pedantic)]

/// Command-line configuration
pub mod config;

/// The session lifecycle state machine
pub mod controller;

/// Call-engine adapter process bridge
pub mod engine;

/// Fatal error taxonomy and exit codes
pub mod errors;

/// Presence polling against the control plane
pub mod presence;

/// Room URL parsing and meeting-token minting
pub mod resolver;

/// The call-transport contract
pub mod transport;

pub use config::Config;
pub use controller::{Phase, SessionController};
pub use errors::SentinelError;
pub use presence::{PollPolicy, PresenceClient};
pub use resolver::{Room, RoomResolver};
pub use transport::{CallTransport, ParticipantCounts, TransportEvent};
