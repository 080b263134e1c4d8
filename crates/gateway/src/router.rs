//! Inbound router: validated messages to the agent runtime.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cloudbot_media::{DownloadedMedia, MediaTransfer};
use cloudbot_protocol::InboundMessage;
use cloudbot_protocol::constants::CHANNEL_ID;

use crate::dispatcher::{OutboundDispatcher, ReplyTarget};
use crate::runtime::{
    AgentRuntime, CommandSource, InboundContext, Peer, ReplyDispatcherOptions, RuntimeError,
};

/// Per-socket routing state. One per connection; shared by every message
/// task spawned from it.
pub(crate) struct Router {
    pub(crate) account_id: String,
    pub(crate) server_url: String,
    pub(crate) media: Arc<dyn MediaTransfer>,
    pub(crate) runtime: Arc<dyn AgentRuntime>,
    pub(crate) outbound: OutboundDispatcher,
}

impl Router {
    /// Handles `message` on its own task. Failures are logged at the task
    /// boundary and never reach the socket.
    pub(crate) fn spawn(self: Arc<Self>, message: InboundMessage) -> JoinHandle<()> {
        tokio::spawn(async move {
            let id = message.id.clone();
            if let Err(e) = self.route(message).await {
                error!(account = %self.account_id, message_id = %id, error = %e, "reply dispatch failed");
            }
        })
    }

    pub(crate) async fn route(&self, message: InboundMessage) -> Result<(), RuntimeError> {
        info!(
            account = %self.account_id,
            user = %message.user_id,
            conversation = %message.conversation_id,
            message_id = %message.id,
            has_media = message.has_media(),
            "inbound message"
        );

        let media = self.download_media(&message).await;

        let peer = Peer::dm(&message.user_id);
        let route = self.runtime.resolve_agent_route(CHANNEL_ID, &peer);
        debug!(agent = %route.agent_id, session = %route.session_key, "resolved route");

        let ctx = build_context(
            &self.account_id,
            &message,
            &route.session_key,
            media.as_ref(),
            chrono::Utc::now().timestamp_millis(),
        );
        let ctx = self.runtime.finalize_inbound_context(ctx);

        let dispatcher = self
            .runtime
            .create_reply_dispatcher(ReplyDispatcherOptions {
                outbound: self.outbound.clone(),
                target: ReplyTarget {
                    to: message.user_id.clone(),
                    conversation_id: message.conversation_id.clone(),
                },
                agent_id: route.agent_id,
                response_prefix: String::new(),
            });

        self.runtime.dispatch_reply(ctx, dispatcher).await
    }

    /// Downloads the attachment, if any. Failure leaves the message without
    /// media rather than dropping it.
    async fn download_media(&self, message: &InboundMessage) -> Option<DownloadedMedia> {
        let (Some(file_path), Some(_)) = (&message.file_path, &message.media_type) else {
            return None;
        };

        match self
            .media
            .download(&self.server_url, file_path, &message.user_id)
            .await
        {
            Ok(media) => {
                info!(path = %media.path.display(), mime = %media.mime_type, "media downloaded");
                Some(media)
            }
            Err(e) => {
                warn!(file_path = %file_path, error = %e, "media download failed, continuing without it");
                None
            }
        }
    }
}

/// Builds the canonical context for one message.
pub(crate) fn build_context(
    account_id: &str,
    message: &InboundMessage,
    session_key: &str,
    media: Option<&DownloadedMedia>,
    timestamp: i64,
) -> InboundContext {
    let user = &message.user_id;
    let body = if message.text.is_empty() {
        media_placeholder(
            message.media_type.as_deref(),
            media.map(|m| m.original_name.as_str()),
        )
    } else {
        message.text.clone()
    };
    let media_path = media.map(|m| m.path.clone());

    InboundContext {
        body,
        raw_body: message.text.clone(),
        command_body: message.text.clone(),
        from: format!("{CHANNEL_ID}:{user}"),
        to: user.clone(),
        session_key: session_key.to_string(),
        account_id: account_id.to_string(),
        chat_type: "direct",
        conversation_label: message.conversation_id.clone(),
        sender_name: user.clone(),
        sender_id: user.clone(),
        provider: CHANNEL_ID,
        surface: CHANNEL_ID,
        message_sid: message.id.clone(),
        timestamp,
        command_source: if message.text.is_empty() {
            CommandSource::File
        } else {
            CommandSource::Text
        },
        originating_channel: CHANNEL_ID,
        originating_to: user.clone(),
        media_url: media_path.as_ref().map(|p| p.display().to_string()),
        media_path,
        media_type: message.media_type.clone(),
    }
}

/// `<media:type:name>` when the original name is known, else `<media:type>`.
fn media_placeholder(media_type: Option<&str>, original_name: Option<&str>) -> String {
    let kind = media_type.unwrap_or("file");
    match original_name.filter(|n| !n.is_empty()) {
        Some(name) => format!("<media:{kind}:{name}>"),
        None => format!("<media:{kind}>"),
    }
}
