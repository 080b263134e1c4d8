use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::codec::Rejection;
use crate::constants::{CHANNEL_ID, DEFAULT_CONVERSATION_ID, UNKNOWN_USER_ID};

// ---------------------------------------------------------------------------
// Inbound (backend -> bridge)
// ---------------------------------------------------------------------------

/// The `data` object of an inbound `message` envelope, as sent on the wire.
///
/// Every field is optional here; [`InboundData::validate`] applies defaults
/// and rejects messages that carry no content. A field holding anything but
/// a string reads as absent. Unknown keys (`recipientId`, `to`, ...) are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundData {
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// A validated inbound chat message with all defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Message body; empty when the message only carries a file.
    pub text: String,
    pub user_id: String,
    pub conversation_id: String,
    pub id: String,
    pub file_path: Option<String>,
    pub media_type: Option<String>,
}

impl InboundMessage {
    /// Returns `true` if the message references a downloadable attachment.
    pub fn has_media(&self) -> bool {
        self.file_path.is_some() && self.media_type.is_some()
    }
}

impl InboundData {
    /// Applies defaults and checks that the message carries content.
    ///
    /// `now_millis` seeds the generated message id when the backend did not
    /// send one. Empty strings count as absent.
    pub fn validate(self, now_millis: i64) -> Result<InboundMessage, Rejection> {
        let text = non_empty(self.text);
        let file_path = non_empty(self.file_path);

        if text.is_none() && file_path.is_none() {
            return Err(Rejection::Empty);
        }

        Ok(InboundMessage {
            text: text.unwrap_or_default(),
            user_id: non_empty(self.user_id).unwrap_or_else(|| UNKNOWN_USER_ID.into()),
            conversation_id: non_empty(self.conversation_id)
                .unwrap_or_else(|| DEFAULT_CONVERSATION_ID.into()),
            id: non_empty(self.id).unwrap_or_else(|| format!("{CHANNEL_ID}-{now_millis}")),
            file_path,
            media_type: non_empty(self.media_type),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Outbound (bridge -> backend)
// ---------------------------------------------------------------------------

/// The `data` object of an outbound `message` envelope.
///
/// `text` and `conversationId` are always present on the wire. The media
/// identifier is written to both `mediaUrl` and `fileId` so backends reading
/// either field see the uploaded reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundData {
    #[serde(default)]
    pub text: String,
    pub recipient_id: String,
    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

fn default_conversation_id() -> String {
    DEFAULT_CONVERSATION_ID.into()
}

impl OutboundData {
    /// Creates a text message for a recipient in the default conversation.
    pub fn text(recipient_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            recipient_id: recipient_id.into(),
            conversation_id: default_conversation_id(),
            media_url: None,
            file_id: None,
        }
    }

    /// Sets the conversation id, falling back to the default when `None`.
    pub fn in_conversation(mut self, conversation_id: Option<&str>) -> Self {
        self.conversation_id = conversation_id
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_ID)
            .to_string();
        self
    }

    /// Attaches a remote media identifier (never a local path).
    pub fn with_media(mut self, file_id: impl Into<String>) -> Self {
        let file_id = file_id.into();
        self.media_url = Some(file_id.clone());
        self.file_id = Some(file_id);
        self
    }
}
