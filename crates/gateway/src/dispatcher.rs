//! Outbound dispatcher: replies and application sends onto one socket.
//!
//! Unlike [`Gateway::send`](crate::Gateway::send), nothing here is queued.
//! A dispatcher is bound to the socket that was open when it was created;
//! if that socket is gone the send fails immediately with
//! [`GatewayError::NotConnected`].

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use cloudbot_media::MediaTransfer;
use cloudbot_protocol::constants::CHANNEL_ID;
use cloudbot_protocol::{OutboundData, encode};

use crate::connection::ConnectionHandle;
use crate::error::GatewayError;
use crate::runtime::ReplyPayload;

/// Where a reply goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    /// Recipient user id.
    pub to: String,
    pub conversation_id: String,
}

/// Outcome of one outbound send. Never an `Err`: failures are carried in
/// `error` with an empty `message_id`.
#[derive(Debug)]
pub struct DeliveryResult {
    pub channel: &'static str,
    pub message_id: String,
    pub conversation_id: Option<String>,
    pub error: Option<GatewayError>,
}

impl DeliveryResult {
    pub(crate) fn failed(conversation_id: Option<String>, error: GatewayError) -> Self {
        Self {
            channel: CHANNEL_ID,
            message_id: String::new(),
            conversation_id,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Sends envelopes on behalf of one account.
#[derive(Clone)]
pub struct OutboundDispatcher {
    account_id: String,
    handle: Option<ConnectionHandle>,
    media: Arc<dyn MediaTransfer>,
    server_url: String,
}

impl OutboundDispatcher {
    pub(crate) fn new(
        account_id: impl Into<String>,
        handle: Option<ConnectionHandle>,
        media: Arc<dyn MediaTransfer>,
        server_url: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            handle,
            media,
            server_url: server_url.into(),
        }
    }

    /// Validates an outbound target.
    pub fn resolve_target(to: Option<&str>) -> Result<String, GatewayError> {
        match to.map(str::trim) {
            Some(to) if !to.is_empty() => Ok(to.to_string()),
            _ => Err(GatewayError::MissingTarget),
        }
    }

    /// `true` if the bound socket is open.
    pub fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(ConnectionHandle::is_open)
    }

    /// Delivers a runtime reply to `target`.
    pub async fn deliver(&self, reply: &ReplyPayload, target: &ReplyTarget) -> DeliveryResult {
        self.send(
            "outbound",
            &target.to,
            reply.text.as_deref().unwrap_or_default(),
            reply.media_url.as_deref(),
            Some(&target.conversation_id),
        )
        .await
    }

    /// Sends a full payload to `to`.
    pub async fn send_payload(
        &self,
        to: &str,
        payload: &ReplyPayload,
        conversation_id: Option<&str>,
    ) -> DeliveryResult {
        self.send(
            "outbound",
            to,
            payload.text.as_deref().unwrap_or_default(),
            payload.media_url.as_deref(),
            conversation_id,
        )
        .await
    }

    /// Sends plain text to `to` in the default conversation.
    pub async fn send_text(&self, to: &str, text: &str) -> DeliveryResult {
        self.send("text", to, text, None, None).await
    }

    /// Sends an attachment (local path or remote URL) with optional text.
    pub async fn send_media(&self, to: &str, text: &str, media_url: &str) -> DeliveryResult {
        self.send("media", to, text, Some(media_url), None).await
    }

    async fn send(
        &self,
        kind: &str,
        to: &str,
        text: &str,
        media: Option<&str>,
        conversation_id: Option<&str>,
    ) -> DeliveryResult {
        let conversation = conversation_id.map(str::to_string);

        let handle = match self.handle.as_ref() {
            Some(handle) if handle.is_open() => handle,
            _ => {
                warn!(account = %self.account_id, to, "socket not open, cannot send");
                return DeliveryResult::failed(conversation, GatewayError::NotConnected);
            }
        };

        let to = match Self::resolve_target(Some(to)) {
            Ok(to) => to,
            Err(e) => return DeliveryResult::failed(conversation, e),
        };

        let mut data = OutboundData::text(&to, text).in_conversation(conversation_id);
        if let Some(reference) = media.filter(|m| !m.is_empty())
            && let Some(file_id) = self.resolve_media(reference, &to).await
        {
            data = data.with_media(file_id);
        }

        let envelope = match encode(&data) {
            Ok(envelope) => envelope,
            Err(e) => return DeliveryResult::failed(conversation, e.into()),
        };

        if let Err(e) = handle.send_text(envelope).await {
            warn!(account = %self.account_id, to = %to, error = %e, "send failed");
            return DeliveryResult::failed(conversation, e);
        }

        let message_id = format!(
            "{CHANNEL_ID}-{kind}-{}",
            chrono::Utc::now().timestamp_millis()
        );
        info!(
            account = %self.account_id,
            to = %to,
            message_id = %message_id,
            has_media = data.file_id.is_some(),
            "message sent"
        );

        DeliveryResult {
            channel: CHANNEL_ID,
            message_id,
            conversation_id: Some(data.conversation_id),
            error: None,
        }
    }

    /// Turns a media reference into something the backend can fetch.
    ///
    /// Remote URLs pass through; local paths are uploaded. An upload failure
    /// returns `None` so the message goes out text-only.
    async fn resolve_media(&self, reference: &str, user_id: &str) -> Option<String> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Some(reference.to_string());
        }

        let path = Path::new(reference.strip_prefix("file://").unwrap_or(reference));
        match self.media.upload(&self.server_url, path, user_id).await {
            Ok(file_id) => {
                info!(account = %self.account_id, file_id = %file_id, "media uploaded");
                Some(file_id)
            }
            Err(e) => {
                warn!(
                    account = %self.account_id,
                    path = %path.display(),
                    error = %e,
                    "media upload failed, sending text only"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite;

    use super::*;
    use crate::testing::{RecordingMedia, open_handle};

    fn envelope(msg: Option<tungstenite::Message>) -> serde_json::Value {
        match msg {
            Some(tungstenite::Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn resolve_target_rejects_missing() {
        assert!(matches!(
            OutboundDispatcher::resolve_target(None),
            Err(GatewayError::MissingTarget)
        ));
        assert!(matches!(
            OutboundDispatcher::resolve_target(Some("  ")),
            Err(GatewayError::MissingTarget)
        ));
        assert_eq!(OutboundDispatcher::resolve_target(Some("u1")).unwrap(), "u1");
    }

    #[tokio::test]
    async fn deliver_uploads_local_media_before_sending() {
        let (handle, mut wire) = open_handle();
        let media = Arc::new(RecordingMedia::default());
        let dispatcher =
            OutboundDispatcher::new("default", Some(handle), media.clone(), "http://media");

        let reply = ReplyPayload::text("look").with_media("/tmp/out/cat.png");
        let target = ReplyTarget {
            to: "u1".into(),
            conversation_id: "c1".into(),
        };
        let result = dispatcher.deliver(&reply, &target).await;

        assert!(result.is_ok());
        assert!(result.message_id.starts_with("cloud-bot-channel-outbound-"));
        assert_eq!(result.conversation_id.as_deref(), Some("c1"));

        let uploads = media.uploads.lock().unwrap().clone();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "http://media");
        assert_eq!(uploads[0].1, Path::new("/tmp/out/cat.png"));
        assert_eq!(uploads[0].2, "u1");

        let json = envelope(wire.recv().await);
        assert_eq!(json["type"], "message");
        assert_eq!(json["data"]["text"], "look");
        assert_eq!(json["data"]["recipientId"], "u1");
        assert_eq!(json["data"]["conversationId"], "c1");
        assert_eq!(json["data"]["mediaUrl"], "file-1");
        assert_eq!(json["data"]["fileId"], "file-1");
    }

    #[tokio::test]
    async fn remote_media_passes_through() {
        let (handle, mut wire) = open_handle();
        let media = Arc::new(RecordingMedia::default());
        let dispatcher =
            OutboundDispatcher::new("default", Some(handle), media.clone(), "http://media");

        let result = dispatcher
            .send_media("u1", "", "https://cdn.example.com/a.png")
            .await;

        assert!(result.message_id.starts_with("cloud-bot-channel-media-"));
        assert!(media.uploads.lock().unwrap().is_empty());
        let json = envelope(wire.recv().await);
        assert_eq!(json["data"]["mediaUrl"], "https://cdn.example.com/a.png");
        assert_eq!(json["data"]["conversationId"], "default");
    }

    #[tokio::test]
    async fn upload_failure_degrades_to_text() {
        let (handle, mut wire) = open_handle();
        let media = Arc::new(RecordingMedia::failing());
        let dispatcher = OutboundDispatcher::new("default", Some(handle), media, "http://media");

        let result = dispatcher.send_media("u1", "caption", "/missing.png").await;

        assert!(result.is_ok());
        let json = envelope(wire.recv().await);
        assert_eq!(json["data"]["text"], "caption");
        assert!(json["data"].get("mediaUrl").is_none());
        assert!(json["data"].get("fileId").is_none());
    }

    #[tokio::test]
    async fn send_text_uses_default_conversation() {
        let (handle, mut wire) = open_handle();
        let dispatcher = OutboundDispatcher::new(
            "default",
            Some(handle),
            Arc::new(RecordingMedia::default()),
            "http://media",
        );

        let result = dispatcher.send_text("u9", "hello").await;

        assert!(result.message_id.starts_with("cloud-bot-channel-text-"));
        let json = envelope(wire.recv().await);
        assert_eq!(json["data"]["text"], "hello");
        assert_eq!(json["data"]["recipientId"], "u9");
        assert_eq!(json["data"]["conversationId"], "default");
    }

    #[tokio::test]
    async fn disconnected_send_fails_without_upload() {
        let media = Arc::new(RecordingMedia::default());
        let dispatcher = OutboundDispatcher::new("default", None, media.clone(), "http://media");

        let result = dispatcher
            .send_payload(
                "u1",
                &ReplyPayload::text("hi").with_media("/tmp/a.png"),
                Some("c1"),
            )
            .await;

        assert!(matches!(result.error, Some(GatewayError::NotConnected)));
        assert!(result.message_id.is_empty());
        assert_eq!(result.conversation_id.as_deref(), Some("c1"));
        assert!(media.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_target_is_rejected() {
        let (handle, _wire) = open_handle();
        let dispatcher = OutboundDispatcher::new(
            "default",
            Some(handle),
            Arc::new(RecordingMedia::default()),
            "http://media",
        );

        let result = dispatcher.send_text("", "hello").await;
        assert!(matches!(result.error, Some(GatewayError::MissingTarget)));
    }
}
