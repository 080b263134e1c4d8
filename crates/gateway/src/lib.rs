//! Chat bridge gateway.
//!
//! Holds one supervised WebSocket per configured account, turns inbound
//! chat messages into agent runtime contexts and sends the agent's replies
//! back over the same socket.
//!
//! Each connection runs three tasks: a read pump that validates inbound
//! envelopes and watches the pong deadline, a write pump that owns the
//! socket's outbound half, and a ping pump. Unplanned closes are retried
//! with exponential backoff; application messages sent while an account is
//! offline wait in a bounded queue and flush on the next open.

pub mod connection;
pub mod dispatcher;
pub mod error;
mod pumps;
mod queue;
pub mod reconnection;
mod router;
pub mod runtime;
mod supervisor;
#[cfg(test)]
mod testing;
pub mod types;

// Re-export primary types for convenience.
pub use connection::{ConnectionHandle, Connector, TungsteniteConnector, WsTransport};
pub use dispatcher::{DeliveryResult, OutboundDispatcher, ReplyTarget};
pub use error::{ConfigError, GatewayError};
pub use reconnection::ReconnectConfig;
pub use runtime::{
    AgentRoute, AgentRuntime, CommandSource, InboundContext, Peer, PeerKind, ReplyDispatcher,
    ReplyDispatcherOptions, ReplyPayload, RuntimeError, RuntimeFuture,
};
pub use supervisor::Gateway;
pub use types::{
    AccountConfig, AccountState, ConnectionState, GatewayEvent, GatewaySettings, SendStatus,
};
