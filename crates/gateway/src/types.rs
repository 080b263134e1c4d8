//! Public types for the gateway.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cloudbot_protocol::constants::{WS_CONNECT_TIMEOUT, WS_PING_PERIOD, WS_PONG_WAIT};
use cloudbot_protocol::stream_url;

use crate::error::ConfigError;
use crate::reconnection::ReconnectConfig;

/// Connection settings for one chat-backend account.
///
/// Replaced wholesale on reconfiguration; a running connection never sees a
/// partially updated value.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

fn default_api_endpoint() -> String {
    "localhost:8080".into()
}

fn default_server_url() -> String {
    "http://localhost:8080".into()
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_endpoint: default_api_endpoint(),
            use_tls: false,
            server_url: default_server_url(),
        }
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("api_key", &"***")
            .field("api_endpoint", &self.api_endpoint)
            .field("use_tls", &self.use_tls)
            .field("server_url", &self.server_url)
            .finish()
    }
}

impl AccountConfig {
    /// Checks that the fields needed to open a connection are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.api_endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        Ok(())
    }

    /// The stream URL for this account, including the API key.
    pub fn stream_url(&self) -> String {
        stream_url(&self.api_endpoint, self.use_tls, &self.api_key)
    }
}

/// State of the socket owned by an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no pending reconnect.
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Socket is open; sends go straight to the wire.
    Open,
    /// A deliberate close is in progress.
    Closing,
    /// Socket lost; a reconnect timer is armed.
    Reconnecting { attempt: u32 },
}

/// Lifecycle of an account as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Events emitted by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Account or connection state changed.
    StateChanged {
        account_id: String,
        account: AccountState,
        connection: ConnectionState,
    },
    /// A reconnect timer was armed.
    Reconnecting {
        account_id: String,
        attempt: u32,
        delay: Duration,
    },
    /// The reconnect ceiling was reached; the account stays offline until
    /// it is started again.
    ReconnectExhausted { account_id: String },
    /// An inbound payload was discarded.
    InboundDropped { account_id: String, reason: String },
}

/// Outcome of [`Gateway::send`](crate::Gateway::send).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    /// Written to the open socket.
    Sent,
    /// Held in the outbound queue until the next open. `dropped` is the
    /// oldest queued envelope evicted to make room, if any.
    Queued { dropped: Option<String> },
}

/// Gateway tunables.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub reconnect: ReconnectConfig,
    pub ping_period: Duration,
    pub pong_wait: Duration,
    pub connect_timeout: Duration,
    /// Maximum number of envelopes held per account while disconnected.
    pub queue_capacity: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            ping_period: WS_PING_PERIOD,
            pong_wait: WS_PONG_WAIT,
            connect_timeout: WS_CONNECT_TIMEOUT,
            queue_capacity: 1000,
        }
    }
}
