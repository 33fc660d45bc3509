//! Room resolution: URL parsing and meeting-token minting.
//!
//! A raw room URL like `https://mycompany.daily.co/room123` carries everything
//! needed to find the control plane: the first path segment is the room name
//! and the host labels after the first form the API domain, giving
//! `https://api.daily.co/v1/` as the API base. The resolver performs exactly
//! one outbound call (the token POST); a failure there is unrecoverable for
//! the run and is surfaced immediately.

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::errors::SentinelError;

/// Lifetime of the minted meeting token.
///
/// Matches the default presence-poll timeout: a token that outlives the
/// longest possible wait phase by the length of the session is not needed,
/// the engine validates it only at join time.
const MEETING_TOKEN_TTL: Duration = Duration::from_secs(300);

/// A resolved room: identity, endpoints and the credential to join it.
///
/// Immutable after construction; owned by the session controller for the
/// lifetime of the run.
#[derive(Clone)]
pub struct Room {
    /// Room name (first path segment of the room URL).
    pub name: String,

    /// Full room URL handed to the call engine at join time.
    pub room_url: String,

    /// Control-plane API base, always with a trailing slash
    /// (e.g. `https://api.daily.co/v1/`).
    pub api_base_url: String,

    /// Short-lived meeting token minted for this run.
    /// Protected by `SecretString` to prevent accidental logging.
    pub meeting_token: SecretString,
}

/// Custom Debug implementation that redacts the meeting token.
impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("room_url", &self.room_url)
            .field("api_base_url", &self.api_base_url)
            .field("meeting_token", &"[REDACTED]")
            .finish()
    }
}

/// Meeting-token request body.
#[derive(Serialize)]
struct TokenRequest<'a> {
    properties: TokenProperties<'a>,
}

#[derive(Serialize)]
struct TokenProperties<'a> {
    room_name: &'a str,
    is_owner: bool,
    exp: i64,
    permissions: TokenPermissions,
}

#[derive(Serialize)]
struct TokenPermissions {
    /// The bot keeps itself out of presence-based "human" judgments made by
    /// other tooling. It still counts in the raw presence total.
    #[serde(rename = "hasPresence")]
    has_presence: bool,
}

/// Meeting-token response body.
#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Derives room identity and API endpoints from a room URL and mints the
/// access credential for this run.
pub struct RoomResolver {
    http: reqwest::Client,
    api_key: SecretString,
}

impl RoomResolver {
    /// Create a resolver sharing the process-wide HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client, api_key: SecretString) -> Self {
        Self { http, api_key }
    }

    /// Resolve a raw room URL into a [`Room`], minting its meeting token.
    ///
    /// # Errors
    ///
    /// - `SentinelError::Config` if the URL cannot be parsed into a room name
    ///   and API domain (surfaced before any network call).
    /// - `SentinelError::Credential` if the token endpoint returns a
    ///   non-success status (carries status and body for diagnostics).
    /// - `SentinelError::Http` on network-level failures.
    pub async fn resolve(&self, raw_url: &str) -> Result<Room, SentinelError> {
        let (name, api_base_url) = parse_room_url(raw_url)?;
        debug!(room = %name, api_base = %api_base_url, "parsed room URL");

        let meeting_token = self.mint_meeting_token(&api_base_url, &name).await?;
        info!(room = %name, "meeting token minted");

        Ok(Room {
            name,
            room_url: raw_url.to_string(),
            api_base_url,
            meeting_token,
        })
    }

    /// Request a short-lived owner token scoped to `room_name`.
    async fn mint_meeting_token(
        &self,
        api_base_url: &str,
        room_name: &str,
    ) -> Result<SecretString, SentinelError> {
        let endpoint = format!("{api_base_url}meeting-tokens");

        #[allow(clippy::cast_possible_wrap)]
        let exp = chrono::Utc::now().timestamp() + MEETING_TOKEN_TTL.as_secs() as i64;

        let body = TokenRequest {
            properties: TokenProperties {
                room_name,
                is_owner: true,
                exp,
                permissions: TokenPermissions {
                    has_presence: false,
                },
            },
        };

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SentinelError::Credential { status, body });
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(SecretString::from(token_response.token))
    }
}

/// Split a room URL into its room name and control-plane API base.
///
/// The room name is the first path segment; the API domain is every host
/// label after the first, so `mycompany.daily.co` resolves against
/// `https://api.daily.co/v1/`.
///
/// # Errors
///
/// Returns `SentinelError::Config` when the URL is unparseable, has no host,
/// has fewer than two host labels, or has an empty path.
pub fn parse_room_url(raw_url: &str) -> Result<(String, String), SentinelError> {
    let url = Url::parse(raw_url)
        .map_err(|e| SentinelError::Config(format!("invalid room URL {raw_url:?}: {e}")))?;

    let host = url
        .host_str()
        .ok_or_else(|| SentinelError::Config(format!("room URL {raw_url:?} has no host")))?;

    let mut labels = host.split('.');
    let _subdomain = labels.next();
    let api_host = labels.collect::<Vec<_>>().join(".");
    if api_host.is_empty() {
        return Err(SentinelError::Config(format!(
            "room URL host {host:?} has no API domain after the subdomain"
        )));
    }

    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| {
            SentinelError::Config(format!("room URL {raw_url:?} has no room name in its path"))
        })?
        .to_string();

    Ok((name, format!("https://api.{api_host}/v1/")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_room_url() {
        let (name, api_base) = parse_room_url("https://mycompany.daily.co/room123")
            .expect("URL should parse");

        assert_eq!(name, "room123");
        assert_eq!(api_base, "https://api.daily.co/v1/");
    }

    #[test]
    fn test_parse_room_url_deep_path_uses_first_segment() {
        let (name, _) = parse_room_url("https://mycompany.daily.co/room123/extra")
            .expect("URL should parse");
        assert_eq!(name, "room123");
    }

    #[test]
    fn test_parse_room_url_rejects_garbage() {
        assert!(matches!(
            parse_room_url("not a url"),
            Err(SentinelError::Config(_))
        ));
    }

    #[test]
    fn test_parse_room_url_rejects_missing_room_name() {
        assert!(matches!(
            parse_room_url("https://mycompany.daily.co/"),
            Err(SentinelError::Config(_))
        ));
    }

    #[test]
    fn test_parse_room_url_rejects_bare_host() {
        // A single-label host leaves nothing to build the API domain from.
        assert!(matches!(
            parse_room_url("https://localhost/room123"),
            Err(SentinelError::Config(_))
        ));
    }

    #[test]
    fn test_room_debug_redacts_token() {
        let room = Room {
            name: "room123".to_string(),
            room_url: "https://mycompany.daily.co/room123".to_string(),
            api_base_url: "https://api.daily.co/v1/".to_string(),
            meeting_token: SecretString::from("very-secret-token"),
        };

        let debug_output = format!("{room:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("very-secret-token"));
    }

    fn test_resolver() -> RoomResolver {
        RoomResolver::new(reqwest::Client::new(), SecretString::from("test-api-key"))
    }

    #[tokio::test]
    async fn test_mint_meeting_token_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/meeting-tokens"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(body_partial_json(serde_json::json!({
                "properties": {
                    "room_name": "room123",
                    "is_owner": true,
                    "permissions": { "hasPresence": false }
                }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "token": "minted-token"
                })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = test_resolver()
            .mint_meeting_token(&format!("{}/v1/", server.uri()), "room123")
            .await
            .expect("token should mint");

        assert_eq!(token.expose_secret(), "minted-token");
    }

    #[tokio::test]
    async fn test_mint_meeting_token_failure_carries_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/meeting-tokens"))
            .respond_with(ResponseTemplate::new(403).set_body_string("key revoked"))
            .expect(1)
            .mount(&server)
            .await;

        let result = test_resolver()
            .mint_meeting_token(&format!("{}/v1/", server.uri()), "room123")
            .await;

        match result {
            Err(SentinelError::Credential { status, body }) => {
                assert_eq!(status.as_u16(), 403);
                assert_eq!(body, "key revoked");
            }
            other => panic!("expected Credential error, got {other:?}"),
        }
    }
}
