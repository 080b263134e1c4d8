//! Built-in echo runtime.
//!
//! Stands in for a real agent runtime: every peer is routed to agent `main`
//! and every message is answered with `[Auto Reply] <text>`.

use cloudbot_gateway::{
    AgentRoute, AgentRuntime, InboundContext, Peer, ReplyDispatcher, ReplyPayload, RuntimeError,
    RuntimeFuture,
};

const AGENT_ID: &str = "main";
const REPLY_PREFIX: &str = "[Auto Reply] ";

#[derive(Debug, Default, Clone)]
pub struct EchoRuntime;

impl AgentRuntime for EchoRuntime {
    fn resolve_agent_route(&self, channel: &str, peer: &Peer) -> AgentRoute {
        AgentRoute {
            agent_id: AGENT_ID.into(),
            session_key: format!("agent:{AGENT_ID}:{channel}:dm:{}", peer.id),
        }
    }

    fn dispatch_reply<'a>(
        &'a self,
        ctx: InboundContext,
        dispatcher: ReplyDispatcher,
    ) -> RuntimeFuture<'a, Result<(), RuntimeError>> {
        Box::pin(async move {
            tracing::debug!(
                session = %ctx.session_key,
                from = %ctx.from,
                media = ctx.media_path.is_some(),
                "echoing message"
            );
            let result = dispatcher
                .deliver(ReplyPayload::text(format!("{REPLY_PREFIX}{}", ctx.body)))
                .await;
            match result.error {
                Some(e) => Err(RuntimeError::Dispatch(e.to_string())),
                None => Ok(()),
            }
        })
    }
}
