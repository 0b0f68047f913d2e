use std::sync::Arc;

use tracing::error;

use crate::broadcast::BroadcastEngine;
use crate::scheduler::{Scheduler, Trigger};

/// Register the quote broadcast on the given trigger
pub async fn register_broadcast(
    scheduler: &Scheduler,
    trigger: &Trigger,
    engine: Arc<BroadcastEngine>,
) -> anyhow::Result<()> {
    scheduler
        .add_job(trigger, "broadcast", move || {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                if let Err(e) = engine.run().await {
                    error!("Broadcast run aborted: {:#}", e);
                }
            })
        })
        .await
}
