use serde::{Deserialize, Serialize};

use crate::constants::MessageType;
use crate::messages::OutboundData;

/// Envelope for all WebSocket communication: `{"type": ..., "data": ...}`.
///
/// The `data` field uses `serde_json::value::RawValue` to defer
/// deserialization until the type is known.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub msg_type: Option<MessageType>,
    #[serde(default)]
    pub data: Option<Box<serde_json::value::RawValue>>,
}

impl Envelope {
    /// Deserializes the data into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}

/// Outbound envelope. The type is always `message`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope<'a> {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub data: &'a OutboundData,
}

impl<'a> OutboundEnvelope<'a> {
    pub fn message(data: &'a OutboundData) -> Self {
        Self {
            msg_type: MessageType::Message,
            data,
        }
    }
}
