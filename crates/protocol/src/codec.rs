//! Envelope codec: bytes to typed frames and back.
//!
//! Decoding never panics and never hands a half-parsed value to the caller:
//! it either yields a [`Frame`] or a [`Rejection`] explaining why the bytes
//! were dropped. Rejections are expected traffic, not failures.

use serde_json::error::Category;

use crate::constants::{MessageType, WS_MAX_MESSAGE_SIZE};
use crate::envelope::{Envelope, OutboundEnvelope};
use crate::messages::{InboundData, OutboundData};

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A chat message; not yet validated for content.
    Message(InboundData),
    /// Any other envelope type. Carries no actionable content.
    Other(MessageType),
}

/// Why an inbound payload was dropped.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("message too large ({0} bytes)")]
    Oversized(usize),

    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unexpected envelope shape: {0}")]
    InvalidShape(#[source] serde_json::Error),

    #[error("envelope has no type")]
    MissingType,

    #[error("message envelope has no data")]
    MissingData,

    #[error("message has neither text nor filePath")]
    Empty,
}

/// Errors produced while encoding outbound envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes one WebSocket text payload.
pub fn decode(bytes: &[u8]) -> Result<Frame, Rejection> {
    if bytes.len() > WS_MAX_MESSAGE_SIZE {
        return Err(Rejection::Oversized(bytes.len()));
    }

    let envelope: Envelope = serde_json::from_slice(bytes).map_err(classify)?;

    match envelope.msg_type {
        None => Err(Rejection::MissingType),
        Some(MessageType::Message) => {
            let data = envelope
                .parse_data::<InboundData>()
                .map_err(Rejection::InvalidShape)?
                .ok_or(Rejection::MissingData)?;
            Ok(Frame::Message(data))
        }
        Some(other) => Ok(Frame::Other(other)),
    }
}

/// Encodes an outbound message as a `{"type":"message","data":{...}}` string.
pub fn encode(data: &OutboundData) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&OutboundEnvelope::message(data))?)
}

/// Syntax errors are malformed JSON; data errors are well-formed JSON of the
/// wrong shape (an array, a string, a numeric type field).
fn classify(e: serde_json::Error) -> Rejection {
    match e.classify() {
        Category::Data => Rejection::InvalidShape(e),
        _ => Rejection::Malformed(e),
    }
}
