//! Agent runtime collaborator.
//!
//! The gateway does not generate replies. For every inbound message it asks
//! an [`AgentRuntime`] which agent owns the conversation, hands it the
//! canonical [`InboundContext`] and a [`ReplyDispatcher`] bound to the socket
//! the message arrived on, and lets the runtime decide what (if anything)
//! to send back.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tracing::error;

use crate::dispatcher::{DeliveryResult, OutboundDispatcher, ReplyTarget};

/// Boxed future returned by [`AgentRuntime`] methods.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("reply dispatch failed: {0}")]
    Dispatch(String),

    #[error("agent runtime unavailable")]
    Unavailable,
}

/// Kind of conversation peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    /// Direct message with a single user.
    Dm,
}

/// The remote party a message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub kind: PeerKind,
    pub id: String,
}

impl Peer {
    pub fn dm(id: impl Into<String>) -> Self {
        Self {
            kind: PeerKind::Dm,
            id: id.into(),
        }
    }
}

/// Routing decision for a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRoute {
    pub agent_id: String,
    pub session_key: String,
}

/// How the message body was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    Text,
    File,
}

/// Canonical inbound context handed to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundContext {
    /// Text, or a `<media:...>` placeholder for attachment-only messages.
    pub body: String,
    pub raw_body: String,
    pub command_body: String,
    /// `cloud-bot-channel:<userId>`.
    pub from: String,
    pub to: String,
    pub session_key: String,
    pub account_id: String,
    /// Always `direct`.
    pub chat_type: &'static str,
    pub conversation_label: String,
    pub sender_name: String,
    pub sender_id: String,
    pub provider: &'static str,
    pub surface: &'static str,
    pub message_sid: String,
    /// Receive time in Unix milliseconds.
    pub timestamp: i64,
    pub command_source: CommandSource,
    pub originating_channel: &'static str,
    pub originating_to: String,
    pub media_path: Option<PathBuf>,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
}

/// A reply produced by the runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyPayload {
    pub text: Option<String>,
    /// Local path or remote URL of an attachment.
    pub media_url: Option<String>,
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            media_url: None,
        }
    }

    pub fn with_media(mut self, media_url: impl Into<String>) -> Self {
        self.media_url = Some(media_url.into());
        self
    }
}

/// Inputs for [`AgentRuntime::create_reply_dispatcher`].
#[derive(Clone)]
pub struct ReplyDispatcherOptions {
    pub outbound: OutboundDispatcher,
    pub target: ReplyTarget,
    pub agent_id: String,
    /// Prepended to every text reply; empty for none.
    pub response_prefix: String,
}

/// Delivers runtime replies to the peer of one inbound message.
#[derive(Clone)]
pub struct ReplyDispatcher {
    outbound: OutboundDispatcher,
    target: ReplyTarget,
    agent_id: String,
    response_prefix: String,
}

impl ReplyDispatcher {
    pub fn new(options: ReplyDispatcherOptions) -> Self {
        Self {
            outbound: options.outbound,
            target: options.target,
            agent_id: options.agent_id,
            response_prefix: options.response_prefix,
        }
    }

    pub fn target(&self) -> &ReplyTarget {
        &self.target
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Sends one reply. Failures are logged and reported in the result.
    pub async fn deliver(&self, mut payload: ReplyPayload) -> DeliveryResult {
        if !self.response_prefix.is_empty()
            && let Some(text) = payload.text.as_mut()
            && !text.is_empty()
        {
            text.insert_str(0, &self.response_prefix);
        }

        let result = self.outbound.deliver(&payload, &self.target).await;
        if let Some(err) = &result.error {
            error!(
                agent = %self.agent_id,
                to = %self.target.to,
                error = %err,
                "reply delivery failed"
            );
        }
        result
    }
}

/// The runtime that owns agents, sessions and reply generation.
pub trait AgentRuntime: Send + Sync {
    /// Picks the agent and session for a peer on `channel`.
    fn resolve_agent_route(&self, channel: &str, peer: &Peer) -> AgentRoute;

    /// Last chance to adjust the context before dispatch.
    fn finalize_inbound_context(&self, ctx: InboundContext) -> InboundContext {
        ctx
    }

    /// Builds the dispatcher replies go through. Runtimes that add typing
    /// indicators or pacing wrap this.
    fn create_reply_dispatcher(&self, options: ReplyDispatcherOptions) -> ReplyDispatcher {
        ReplyDispatcher::new(options)
    }

    /// Runs the agent for `ctx`, delivering any replies through `dispatcher`.
    fn dispatch_reply<'a>(
        &'a self,
        ctx: InboundContext,
        dispatcher: ReplyDispatcher,
    ) -> RuntimeFuture<'a, Result<(), RuntimeError>>;
}
