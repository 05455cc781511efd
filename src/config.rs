//! Typed, immutable configuration surface for a [`Client`].
//!
//! Constructed once and validated at construction time; there is no ambient
//! global configuration.
//!
//! [`Client`]: crate::client::Client

use std::time::Duration;

use derive_more::Display;
use serde::Deserialize;
use url::Url;

use crate::media::AudioMediaTemplate;

/// Default deadline for [`TransportConfig::ws_timeout`].
const DEFAULT_WS_TIMEOUT: Duration = Duration::from_secs(10);

/// Default value for [`TransportConfig::registration_expires`].
const DEFAULT_REGISTRATION_EXPIRES: u32 = 600;

/// Errors that can occur while validating a [`TransportConfig`].
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum ConfigError {
    /// `transport.wsServers` was empty.
    #[display(fmt = "`transport.wsServers` must contain at least one URI")]
    NoWebSocketServers,

    /// One of `transport.wsServers` failed to parse as a `wss://` URI.
    #[display(fmt = "`{}` is not a valid `wss://` URI", _0)]
    InvalidWebSocketServer(String),

    /// `account.uri` failed to parse as a SIP URI.
    #[display(fmt = "`account.uri` is not a valid URI: {}", _0)]
    InvalidAccountUri(String),
}

/// SIP registration identity, as specified by `account.*` options.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    /// `account.user` — registration username.
    pub user: String,

    /// `account.password` — registration password.
    pub password: String,

    /// `account.uri` — the authoritative SIP URI of this user agent.
    pub uri: String,
}

/// A single STUN/TURN server passed through to the peer connection created
/// by the underlying SIP stack.
#[derive(Clone, Debug, Deserialize, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    /// `urls` of this ICE server.
    pub urls: Vec<String>,

    /// Optional TURN `username`.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional TURN `credential`.
    #[serde(default)]
    pub credential: Option<String>,
}

/// Raw, unvalidated configuration shape, as received across the wasm-bindgen
/// boundary (`account.*`, `transport.*`, `userAgentString`, `media.*`).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    /// `account.*` options.
    pub account: AccountConfig,

    /// `transport.wsServers` — ordered list of `wss://…` endpoints.
    pub ws_servers: Vec<String>,

    /// `transport.wsTimeout`, in milliseconds.
    #[serde(default)]
    pub ws_timeout_ms: Option<u64>,

    /// `transport.iceServers`.
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,

    /// `registrationExpires`, in seconds.
    #[serde(default)]
    pub registration_expires: Option<u32>,

    /// `userAgentString`.
    #[serde(default)]
    pub user_agent_string: Option<String>,

    /// `media.input` capture template.
    #[serde(default)]
    pub media_input: AudioMediaTemplate,

    /// `media.output` playback template.
    #[serde(default)]
    pub media_output: AudioMediaTemplate,
}

/// Resolved, validated, immutable transport configuration.
///
/// Constructed once via [`TransportConfig::try_from`] and never mutated
/// afterward.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportConfig {
    account: AccountConfig,
    ws_servers: Vec<Url>,
    ws_timeout: Duration,
    ice_servers: Vec<IceServer>,
    registration_expires: u32,
    user_agent_string: Option<String>,
    media_input: AudioMediaTemplate,
    media_output: AudioMediaTemplate,
}

impl TransportConfig {
    /// Returns the registration identity.
    #[must_use]
    pub fn account(&self) -> &AccountConfig {
        &self.account
    }

    /// Returns the ordered list of `wss://` signaling endpoints.
    #[must_use]
    pub fn ws_servers(&self) -> &[Url] {
        &self.ws_servers
    }

    /// Returns the deadline within which the UA must open its transport and
    /// register.
    #[must_use]
    pub fn ws_timeout(&self) -> Duration {
        self.ws_timeout
    }

    /// Returns the configured STUN/TURN servers.
    #[must_use]
    pub fn ice_servers(&self) -> &[IceServer] {
        &self.ice_servers
    }

    /// Returns the `Expires` value sent with each `REGISTER`, in seconds.
    #[must_use]
    pub fn registration_expires(&self) -> u32 {
        self.registration_expires
    }

    /// Returns the `User-Agent` header value, if configured.
    #[must_use]
    pub fn user_agent_string(&self) -> Option<&str> {
        self.user_agent_string.as_deref()
    }

    /// Returns the capture device template.
    #[must_use]
    pub fn media_input(&self) -> &AudioMediaTemplate {
        &self.media_input
    }

    /// Returns the playback device template.
    #[must_use]
    pub fn media_output(&self) -> &AudioMediaTemplate {
        &self.media_output
    }
}

impl TryFrom<RawConfig> for TransportConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        if raw.ws_servers.is_empty() {
            return Err(ConfigError::NoWebSocketServers);
        }
        let ws_servers = raw
            .ws_servers
            .iter()
            .map(|s| {
                Url::parse(s)
                    .map_err(|_| ConfigError::InvalidWebSocketServer(s.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Url::parse(&raw.account.uri)
            .map_err(|_| ConfigError::InvalidAccountUri(raw.account.uri.clone()))?;

        Ok(Self {
            account: raw.account,
            ws_servers,
            ws_timeout: raw
                .ws_timeout_ms
                .map_or(DEFAULT_WS_TIMEOUT, Duration::from_millis),
            ice_servers: raw.ice_servers,
            registration_expires: raw
                .registration_expires
                .unwrap_or(DEFAULT_REGISTRATION_EXPIRES),
            user_agent_string: raw.user_agent_string,
            media_input: raw.media_input,
            media_output: raw.media_output,
        })
    }
}
