pub mod callbacks;
pub mod commands;

use tracing::debug;

use crate::platform::{Update, UpdateKind};

pub use callbacks::CallbackHandler;
pub use commands::CommandHandler;

/// Dispatches each update to exactly one handler.
///
/// Handlers absorb their own failures, so routing never fails and the caller
/// can advance the cursor regardless of what happened inside.
pub struct UpdateRouter {
    commands: CommandHandler,
    callbacks: CallbackHandler,
}

impl UpdateRouter {
    pub fn new(commands: CommandHandler, callbacks: CallbackHandler) -> Self {
        Self {
            commands,
            callbacks,
        }
    }

    pub async fn route(&self, update: &Update) {
        match &update.kind {
            UpdateKind::Message(message) => self.commands.handle(message).await,
            UpdateKind::Callback(query) => self.callbacks.handle(query).await,
            UpdateKind::Other => debug!("Ignoring update {} of unhandled type", update.id),
        }
    }
}
