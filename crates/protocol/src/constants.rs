use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Channel identifier used as the provider/surface name and id prefix.
pub const CHANNEL_ID: &str = "cloud-bot-channel";

/// Path of the streaming endpoint on the chat backend.
pub const STREAM_PATH: &str = "/v1/stream";

/// Conversation id used when a message does not carry one.
pub const DEFAULT_CONVERSATION_ID: &str = "default";

/// Sender id used when an inbound message does not carry one.
pub const UNKNOWN_USER_ID: &str = "unknown";

/// Account id used when the configuration names a single account.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// How often to send keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(30);

/// Read deadline: if *nothing* arrives within this window (no pong, no
/// message) the connection is considered dead. Two ping periods.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Time allowed for the TCP + WebSocket handshake.
pub const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for the close frame to be flushed on a deliberate close.
pub const WS_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum message size in bytes (16 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Envelope type identifier.
///
/// Only [`MessageType::Message`] carries chat traffic; the keepalive types
/// are listed so they are recognised rather than reported as unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "message")]
    Message,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,

    /// Forward compatibility: unknown envelope types deserialize here.
    #[serde(other)]
    Unknown,
}
