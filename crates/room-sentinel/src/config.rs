//! Command-line configuration.
//!
//! The bot is configured entirely from its invocation: a room URL and a
//! control-plane API key are required, everything else has defaults. The API
//! key is held as a `SecretString` and redacted in Debug output.

use std::fmt;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;

use crate::errors::SentinelError;
use crate::presence::PollPolicy;

/// Default command used to launch the call-engine adapter process.
pub const DEFAULT_ENGINE_COMMAND: &str = "call-engine-adapter";

/// Default seconds between presence polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

/// Default seconds to wait for the first participant.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 300;

/// Raw command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "room-sentinel",
    about = "Joins a conference room once a participant is present and leaves when it is the last one in"
)]
pub struct Cli {
    /// Room URL to attend (e.g. https://mycompany.daily.co/standup)
    #[arg(long)]
    pub url: String,

    /// Control-plane API key
    #[arg(long, env = "ROOM_SENTINEL_API_KEY", hide_env_values = true)]
    pub key: String,

    /// Command used to launch the call-engine adapter process
    #[arg(long, default_value = DEFAULT_ENGINE_COMMAND)]
    pub engine: String,

    /// Extra argument passed to the engine adapter (repeatable)
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Seconds between presence polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Seconds to wait for the first participant before giving up
    #[arg(long, default_value_t = DEFAULT_POLL_TIMEOUT_SECS)]
    pub poll_timeout_secs: u64,
}

/// Validated runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Room URL to attend.
    pub room_url: String,

    /// Control-plane API key.
    /// Protected by `SecretString` to prevent accidental logging.
    pub api_key: SecretString,

    /// Command used to launch the call-engine adapter process.
    pub engine_command: String,

    /// Extra arguments passed to the engine adapter.
    pub engine_args: Vec<String>,

    /// Presence polling policy.
    pub poll_policy: PollPolicy,
}

/// Custom Debug implementation that redacts the API key.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("room_url", &self.room_url)
            .field("api_key", &"[REDACTED]")
            .field("engine_command", &self.engine_command)
            .field("engine_args", &self.engine_args)
            .field("poll_policy", &self.poll_policy)
            .finish()
    }
}

impl Config {
    /// Validate raw CLI arguments into a runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns `SentinelError::Config` for values clap cannot reject on its
    /// own (empty strings, a zero poll timeout). All validation happens
    /// before any network activity.
    pub fn from_cli(cli: Cli) -> Result<Self, SentinelError> {
        if cli.url.trim().is_empty() {
            return Err(SentinelError::Config("room URL must not be empty".into()));
        }
        if cli.key.trim().is_empty() {
            return Err(SentinelError::Config("API key must not be empty".into()));
        }
        if cli.poll_timeout_secs == 0 {
            return Err(SentinelError::Config(
                "poll timeout must be at least 1 second".into(),
            ));
        }

        Ok(Config {
            room_url: cli.url,
            api_key: SecretString::from(cli.key),
            engine_command: cli.engine,
            engine_args: cli.engine_args,
            poll_policy: PollPolicy {
                interval: Duration::from_secs(cli.poll_interval_secs),
                timeout: Duration::from_secs(cli.poll_timeout_secs),
            },
        })
    }
}
