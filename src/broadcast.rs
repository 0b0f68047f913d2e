use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::platform::ChatPlatform;
use crate::quote::QuoteSource;
use crate::retry::{with_timeout, RetryPolicy};
use crate::store::SubscriberStore;

/// How a run went, judged from its counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastSummary {
    /// No failures; includes the vacuous run with zero recipients.
    AllSucceeded,
    Partial,
    AllFailed,
}

/// Per-run counters, used only for the run's log summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub started_at: DateTime<Utc>,
    pub used_default_message: bool,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BroadcastOutcome {
    pub fn summary(&self) -> BroadcastSummary {
        match (self.succeeded, self.failed) {
            (_, 0) => BroadcastSummary::AllSucceeded,
            (0, _) => BroadcastSummary::AllFailed,
            _ => BroadcastSummary::Partial,
        }
    }
}

/// Totals across every run since the process started.
#[derive(Debug, Default)]
pub struct RunStats {
    runs_completed: AtomicU64,
    runs_aborted: AtomicU64,
    sends_succeeded: AtomicU64,
    sends_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatsSnapshot {
    pub runs_completed: u64,
    pub runs_aborted: u64,
    pub sends_succeeded: u64,
    pub sends_failed: u64,
}

impl RunStats {
    fn record(&self, outcome: &BroadcastOutcome) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.sends_succeeded
            .fetch_add(outcome.succeeded as u64, Ordering::Relaxed);
        self.sends_failed
            .fetch_add(outcome.failed as u64, Ordering::Relaxed);
    }

    fn record_abort(&self) {
        self.runs_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_aborted: self.runs_aborted.load(Ordering::Relaxed),
            sends_succeeded: self.sends_succeeded.load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
        }
    }
}

/// Fetches one message and fans it out to every subscriber, one at a time.
pub struct BroadcastEngine {
    quotes: Arc<dyn QuoteSource>,
    platform: Arc<dyn ChatPlatform>,
    subscribers: Arc<dyn SubscriberStore>,
    default_message: String,
    request_timeout: Duration,
    retry: RetryPolicy,
    stats: RunStats,
}

impl BroadcastEngine {
    pub fn new(
        quotes: Arc<dyn QuoteSource>,
        platform: Arc<dyn ChatPlatform>,
        subscribers: Arc<dyn SubscriberStore>,
        default_message: String,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            quotes,
            platform,
            subscribers,
            default_message,
            request_timeout,
            retry,
            stats: RunStats::default(),
        }
    }

    pub fn stats(&self) -> RunStatsSnapshot {
        self.stats.snapshot()
    }

    /// Execute one broadcast.
    ///
    /// Only a failure to read the subscriber list is returned as an error, and
    /// in that case nothing has been sent. Quote and per-recipient failures are
    /// logged and absorbed.
    pub async fn run(&self) -> Result<BroadcastOutcome> {
        let started_at = Utc::now();

        let (message, used_default_message) = self.message().await;

        let chat_ids = match with_timeout(
            self.request_timeout,
            "loading subscribers",
            self.subscribers.subscribed_chat_ids(),
        )
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                self.stats.record_abort();
                return Err(e).context("Failed to load subscribers, no messages sent");
            }
        };

        let mut outcome = BroadcastOutcome {
            started_at,
            used_default_message,
            attempted: chat_ids.len(),
            succeeded: 0,
            failed: 0,
        };

        for chat_id in chat_ids {
            match with_timeout(
                self.request_timeout,
                "sendMessage",
                self.platform.send_message(chat_id, &message, None),
            )
            .await
            {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => {
                    warn!("Failed to send broadcast to {}: {:#}", chat_id, e);
                    outcome.failed += 1;
                }
            }
        }

        self.stats.record(&outcome);
        log_outcome(&outcome);
        Ok(outcome)
    }

    /// The provider's quote, or the configured default when it has none to give.
    async fn message(&self) -> (String, bool) {
        let quotes = &self.quotes;
        let fetched = with_timeout(
            self.request_timeout,
            "quote fetch",
            self.retry.run("quote fetch", move || quotes.fetch_quote()),
        )
        .await;

        match fetched {
            Ok(text) if !text.trim().is_empty() => (text, false),
            Ok(_) => {
                warn!("Quote provider returned an empty quote, using default message");
                (self.default_message.clone(), true)
            }
            Err(e) => {
                warn!("Quote fetch failed, using default message: {:#}", e);
                (self.default_message.clone(), true)
            }
        }
    }
}

fn log_outcome(outcome: &BroadcastOutcome) {
    let elapsed = Utc::now().signed_duration_since(outcome.started_at);
    match outcome.summary() {
        BroadcastSummary::AllSucceeded => info!(
            "Broadcast sent to all {} subscriber(s) in {}ms{}",
            outcome.attempted,
            elapsed.num_milliseconds(),
            if outcome.used_default_message {
                " (default message)"
            } else {
                ""
            }
        ),
        BroadcastSummary::Partial => warn!(
            "Broadcast partially delivered: {} succeeded, {} failed of {}",
            outcome.succeeded, outcome.failed, outcome.attempted
        ),
        BroadcastSummary::AllFailed => error!(
            "Broadcast failed for all {} subscriber(s)",
            outcome.attempted
        ),
    }
}
