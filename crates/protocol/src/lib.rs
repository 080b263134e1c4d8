//! Wire protocol for the chat backend stream.
//!
//! One envelope shape travels in both directions:
//! `{"type": "message", "data": {...}}`. Inbound data is validated into an
//! [`InboundMessage`]; outbound data is built as [`OutboundData`] and encoded
//! with [`codec::encode`].

pub mod codec;
pub mod constants;
pub mod envelope;
pub mod messages;
pub mod url;

// Re-export primary types for convenience.
pub use codec::{Frame, ProtocolError, Rejection, decode, encode};
pub use constants::MessageType;
pub use envelope::{Envelope, OutboundEnvelope};
pub use messages::{InboundData, InboundMessage, OutboundData};
pub use url::{redact_api_key, stream_url};
