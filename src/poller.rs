use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bot::UpdateRouter;
use crate::platform::{ChatPlatform, Update};
use crate::retry::{with_timeout, RetryPolicy};
use crate::store::OffsetStore;

/// Extra client-side allowance on top of the server-side long-poll wait.
const POLL_GRACE: Duration = Duration::from_secs(5);

/// Long-polls the platform, routes every batch and advances the durable cursor.
///
/// The cursor is owned here and only moves forward. It is persisted after a
/// whole batch has been routed, so a crash can replay at most that batch.
pub struct UpdatePoller {
    platform: Arc<dyn ChatPlatform>,
    offsets: Arc<dyn OffsetStore>,
    router: UpdateRouter,
    cursor: i64,
    long_poll: Duration,
    backoff: RetryPolicy,
    consecutive_failures: u32,
}

impl UpdatePoller {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        offsets: Arc<dyn OffsetStore>,
        router: UpdateRouter,
        cursor: i64,
        long_poll: Duration,
        backoff: RetryPolicy,
    ) -> Self {
        Self {
            platform,
            offsets,
            router,
            cursor,
            long_poll,
            backoff,
            consecutive_failures: 0,
        }
    }

    #[allow(dead_code)]
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// One long-poll request for updates after `cursor`.
    ///
    /// Failures of any kind are logged and yield an empty batch; the caller
    /// retries with the same cursor.
    pub async fn fetch(&mut self, cursor: i64) -> Vec<Update> {
        let result = with_timeout(
            self.long_poll + POLL_GRACE,
            "getUpdates",
            self.platform.get_updates(cursor, self.long_poll),
        )
        .await;

        match result {
            Ok(updates) => {
                self.consecutive_failures = 0;
                updates
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Polling updates at offset {} failed ({} in a row): {:#}",
                    cursor, self.consecutive_failures, e
                );
                Vec::new()
            }
        }
    }

    /// Route a batch in order, then advance and persist the cursor.
    pub async fn process_batch(&mut self, batch: Vec<Update>) {
        let Some(max_id) = batch.iter().map(|u| u.id).max() else {
            return;
        };

        for update in &batch {
            self.router.route(update).await;
        }

        let next = max_id + 1;
        if next <= self.cursor {
            debug!(
                "Batch up to {} is behind cursor {}, not moving it",
                max_id, self.cursor
            );
            return;
        }
        self.cursor = next;

        if let Err(e) = self.offsets.save(self.cursor).await {
            warn!("Failed to persist offset {}: {:#}", self.cursor, e);
        }
    }

    /// Poll until `shutdown` is cancelled. An in-flight request is always
    /// allowed to finish; only the backoff sleep is cut short.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Polling for updates from offset {}", self.cursor);

        while !shutdown.is_cancelled() {
            let batch = self.fetch(self.cursor).await;

            if self.consecutive_failures > 0 {
                let delay = self.backoff.delay_for(self.consecutive_failures);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => continue,
                }
            }

            self.process_batch(batch).await;
        }

        info!("Poller stopped at offset {}", self.cursor);
    }
}
