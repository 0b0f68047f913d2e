mod app;
mod bot;
mod broadcast;
mod config;
mod platform;
mod poller;
mod quote;
mod retry;
mod scheduler;
mod store;
#[cfg(test)]
mod testing;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quotecast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Telegram API: {}", config.telegram.api_base_url);
    info!("  Quote endpoint: {}", config.quotes.endpoint);
    info!("  Schedule: {}", config.schedule.expression);
    info!("  Database: {}", config.database.path.display());

    app::run(config).await?;

    info!("Bot stopped");
    Ok(())
}
