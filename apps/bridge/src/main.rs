//! cloudbot bridge: connects every enabled account to the chat backend and
//! answers through the built-in echo runtime until interrupted.

mod config;
mod runtime;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use cloudbot_gateway::{Gateway, GatewayEvent, TungsteniteConnector};
use cloudbot_media::MediaClient;

use config::BridgeConfig;
use runtime::EchoRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cloudbot=debug")),
        )
        .init();

    let (cfg, path) = BridgeConfig::load()?;
    let accounts = cfg.enabled_accounts();
    if accounts.is_empty() {
        tracing::warn!(
            path = %path.display(),
            "no enabled accounts, set `enabled = true` and an apiKey in the config"
        );
        return Ok(());
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    let media = Arc::new(MediaClient::new(http, cfg.media_dir()));

    let gateway = Gateway::new(
        Arc::new(TungsteniteConnector),
        Arc::new(EchoRuntime),
        media,
        cfg.settings(),
    );

    if let Some(mut events) = gateway.take_events().await {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log_event(&event);
            }
        });
    }

    for (account_id, account) in accounts {
        if let Err(e) = gateway.start_account(&account_id, account).await {
            tracing::error!(account = %account_id, error = %e, "account not started");
        }
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "bridge running, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    gateway.shutdown().await;
    Ok(())
}

fn log_event(event: &GatewayEvent) {
    match event {
        GatewayEvent::StateChanged {
            account_id,
            account,
            connection,
        } => tracing::debug!(account = %account_id, ?account, ?connection, "state changed"),
        GatewayEvent::Reconnecting { .. } => {}
        GatewayEvent::ReconnectExhausted { account_id } => {
            tracing::error!(account = %account_id, "account offline, restart the bridge to retry")
        }
        GatewayEvent::InboundDropped { account_id, reason } => {
            tracing::debug!(account = %account_id, %reason, "inbound message dropped")
        }
    }
}
