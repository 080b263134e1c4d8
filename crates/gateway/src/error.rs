//! Error types for the gateway.

use tokio_tungstenite::tungstenite;

use cloudbot_protocol::ProtocolError;

/// An account configuration that cannot be used to connect.
///
/// Configuration errors are fatal for the start attempt: no connection is
/// opened and no reconnection is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("apiKey is not configured")]
    MissingApiKey,

    #[error("apiEndpoint is not configured")]
    MissingEndpoint,
}

/// Errors from gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connection timed out")]
    ConnectTimeout,

    #[error("socket not connected")]
    NotConnected,

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("missing target user id")]
    MissingTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            GatewayError::NotConnected.to_string(),
            "socket not connected"
        );
        assert_eq!(
            GatewayError::from(ConfigError::MissingApiKey).to_string(),
            "configuration error: apiKey is not configured"
        );
        assert_eq!(
            GatewayError::UnknownAccount("a1".into()).to_string(),
            "unknown account: a1"
        );
    }
}
