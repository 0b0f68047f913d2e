use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bot::{CallbackHandler, CommandHandler, UpdateRouter};
use crate::broadcast::BroadcastEngine;
use crate::config::Config;
use crate::platform::telegram::TelegramClient;
use crate::platform::ChatPlatform;
use crate::poller::UpdatePoller;
use crate::quote::QuoteClient;
use crate::scheduler::{tasks, Scheduler, Trigger};
use crate::store::{Database, OffsetStore, SubscriberStore};

/// Wire everything together, run until a shutdown signal, then stop cleanly.
///
/// Errors returned from here happen before the event loop starts and are
/// meant to end the process.
pub async fn run(config: Config) -> Result<()> {
    let trigger = Trigger::parse(&config.schedule.expression)?;
    let db = Database::open(&config.database.path)?;

    let offsets: Arc<dyn OffsetStore> = Arc::new(db.offsets());
    let start_offset = offsets
        .load()
        .await
        .context("Failed to read stored update offset")?;

    let platform: Arc<dyn ChatPlatform> = Arc::new(TelegramClient::new(
        &config.telegram.api_base_url,
        &config.telegram.bot_token,
    ));
    let subscribers: Arc<dyn SubscriberStore> = Arc::new(db.subscribers());
    let request_timeout = config.telegram.request_timeout();
    let retry = config.retry.policy();

    let mut commands = CommandHandler::new(platform.clone(), subscribers.clone(), request_timeout);
    if let Some(username) = &config.telegram.bot_username {
        commands = commands.with_bot_username(username.as_str());
    }
    let router = UpdateRouter::new(
        commands,
        CallbackHandler::new(platform.clone(), subscribers.clone(), request_timeout),
    );
    let poller = UpdatePoller::new(
        platform.clone(),
        offsets,
        router,
        start_offset,
        config.telegram.poll_timeout(),
        retry,
    );

    let engine = Arc::new(BroadcastEngine::new(
        Arc::new(QuoteClient::new(config.quotes.endpoint.clone())),
        platform,
        subscribers,
        config.quotes.default_quote.clone(),
        request_timeout,
        retry,
    ));

    let mut scheduler = Scheduler::new().await?;
    tasks::register_broadcast(&scheduler, &trigger, engine.clone()).await?;

    let shutdown = CancellationToken::new();
    let poll_task = tokio::spawn(poller.run(shutdown.clone()));
    scheduler.start().await?;

    info!("Bot is running, press Ctrl-C to stop");
    wait_for_shutdown_signal().await;
    info!("Shutdown requested, finishing in-flight work...");

    shutdown.cancel();
    if let Err(e) = scheduler.shutdown().await {
        error!("Scheduler did not stop cleanly: {:#}", e);
    }
    if let Err(e) = poll_task.await {
        error!("Poller task ended abnormally: {}", e);
    }

    let stats = engine.stats();
    info!(
        "Broadcast runs: {} completed, {} aborted; sends: {} succeeded, {} failed",
        stats.runs_completed, stats.runs_aborted, stats.sends_succeeded, stats.sends_failed
    );
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
