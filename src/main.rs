mod auth;
mod config;
mod error;
mod format;
mod platform;
mod relay;
mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::AuthGate;
use crate::config::Config;
use crate::relay::Relay;
use crate::server::AppState;

fn enabled(on: bool) -> &'static str {
    if on {
        "Enabled ✓"
    } else {
        "Disabled ✗"
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relay_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    info!("Auth: {}", enabled(config.auth_enabled()));
    info!(
        "Discord Bot: {}",
        enabled(config.discord.bot_credentials().is_some())
    );
    info!(
        "Discord Webhook: {}",
        enabled(config.discord.webhook_enabled())
    );
    info!("Telegram: {}", enabled(config.telegram.credentials().is_some()));

    let relay = Relay::from_config(&config).await?;
    let state = AppState::new(AuthGate::new(config.auth.api_key.clone()), relay);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Server running on {}", addr);

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
