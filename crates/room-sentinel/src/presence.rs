//! Presence polling: wait until the room has a participant.
//!
//! This phase is deliberately poll-based. Before joining, no call resources
//! are held and coarse granularity is fine, so the bot blocks its own
//! progress on a fixed-interval loop against the control-plane presence
//! endpoint. After joining, the engine pushes departure events and polling
//! would be redundant (see `controller`).

use std::future::Future;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::errors::SentinelError;
use crate::resolver::Room;

/// Fixed-interval polling policy.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Minimum spacing between presence probes.
    pub interval: Duration,
    /// Deadline for the first satisfying probe.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Presence response body. Ignores everything but the total.
#[derive(Debug, Deserialize)]
struct PresenceResponse {
    total_count: u64,
}

/// Authenticated client for one room's presence endpoint.
pub struct PresenceClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl PresenceClient {
    /// Create a presence client for `room`, sharing the process-wide HTTP
    /// client.
    #[must_use]
    pub fn new(http: reqwest::Client, room: &Room, api_key: SecretString) -> Self {
        let endpoint = format!("{}rooms/{}/presence", room.api_base_url, room.name);
        Self {
            http,
            endpoint,
            api_key,
        }
    }

    /// Fetch the current participant total for the room.
    ///
    /// # Errors
    ///
    /// - `SentinelError::PresenceQuery` on a non-success status (carries
    ///   status and body). Callers treat this as fatal, not as "keep trying".
    /// - `SentinelError::Http` on network-level failures.
    pub async fn total_count(&self) -> Result<u64, SentinelError> {
        let response = self
            .http
            .get(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SentinelError::PresenceQuery { status, body });
        }

        let presence: PresenceResponse = response.json().await?;
        trace!(total_count = presence.total_count, "presence sample");
        Ok(presence.total_count)
    }
}

/// Poll `check` until `succeed_when` holds for its result.
///
/// Probes immediately, then at most once per `policy.interval`. Returns the
/// first count satisfying the predicate. A probe error propagates at once and
/// aborts polling. Once `policy.timeout` has elapsed without success the loop
/// fails with `PresenceTimeout`; the deadline is evaluated after each failed
/// probe, so the last sample may land just past it.
///
/// # Errors
///
/// Whatever `check` returns, or `SentinelError::PresenceTimeout`.
pub async fn poll_until<F, Fut, P>(
    mut check: F,
    succeed_when: P,
    policy: PollPolicy,
) -> Result<u64, SentinelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u64, SentinelError>>,
    P: Fn(u64) -> bool,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;

    loop {
        let count = check().await?;
        if succeed_when(count) {
            debug!(count, elapsed = ?started.elapsed(), "presence predicate satisfied");
            return Ok(count);
        }

        if Instant::now() >= deadline {
            return Err(SentinelError::PresenceTimeout {
                waited: policy.timeout,
            });
        }

        sleep(policy.interval).await;
    }
}
