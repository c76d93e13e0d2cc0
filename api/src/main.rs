//! Storefront realtime relay binary.
//!
//! Entry point for the WebSocket hub and publish endpoint.

use anyhow::Context;
use storefront_realtime_api::{AppState, Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront_realtime_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("loading relay configuration")?;
    let state = AppState::new(&config);

    if config.admin_token.is_none() {
        tracing::warn!("REALTIME_ADMIN_TOKEN not set, admin channels and publishing are closed");
    }
    tracing::info!(
        "Starting storefront realtime relay on {}:{}",
        config.host,
        config.port
    );

    Server::new(config, state).run().await
}
