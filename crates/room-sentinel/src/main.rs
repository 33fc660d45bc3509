//! Room sentinel binary.
//!
//! Startup flow:
//! 1. Initialise tracing
//! 2. Parse and validate command-line configuration (no I/O yet)
//! 3. Build the shared HTTP client
//! 4. Resolve the room (one token-minting call)
//! 5. Launch the call-engine adapter (torn down on every exit path)
//! 6. Run the session controller to completion
//!
//! Exits 0 once the session reaches its terminal phase; any fatal error is
//! logged and mapped to a non-zero exit code (2 for configuration problems,
//! 3 when nobody showed up within the wait deadline, 1 otherwise).

use std::time::Duration;

use clap::Parser;
use room_sentinel::config::{Cli, Config};
use room_sentinel::controller::SessionController;
use room_sentinel::engine::EngineTransport;
use room_sentinel::errors::SentinelError;
use room_sentinel::presence::PresenceClient;
use room_sentinel::resolver::RoomResolver;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Request timeout for control-plane calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection timeout for the HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_sentinel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "session failed");
        eprintln!("room-sentinel: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run() -> Result<(), SentinelError> {
    let config = Config::from_cli(Cli::parse())?;
    info!(
        room_url = %config.room_url,
        engine = %config.engine_command,
        interval = ?config.poll_policy.interval,
        timeout = ?config.poll_policy.timeout,
        "starting room sentinel"
    );

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| SentinelError::Config(format!("failed to build HTTP client: {e}")))?;

    let resolver = RoomResolver::new(http.clone(), config.api_key.clone());
    let room = resolver.resolve(&config.room_url).await?;
    info!(room = %room.name, api_base = %room.api_base_url, "room resolved");

    // Engine acquisition happens before the controller exists; dropping the
    // transport (on success and on every error path) kills the adapter.
    let (transport, events) =
        EngineTransport::spawn(&config.engine_command, &config.engine_args)?;

    let presence = PresenceClient::new(http, &room, config.api_key.clone());
    let mut controller =
        SessionController::new(room, presence, config.poll_policy, transport, events);

    controller.run().await?;
    info!("room sentinel shutdown complete");
    Ok(())
}
