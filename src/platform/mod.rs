pub mod telegram;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Identity of whoever sent a message; the chat id doubles as subscriber key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub chat_id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

/// A text message received from the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub sender: Sender,
    /// Empty for non-text messages
    pub text: String,
}

/// Activation of an inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    pub id: String,
    pub data: String,
    /// Chat of the message that carried the button, when the platform still has it.
    pub origin_chat_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    Message(IncomingMessage),
    Callback(CallbackQuery),
    /// Any update type this bot does not consume.
    Other,
}

/// One inbound event, identified by a monotonically increasing id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub id: i64,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Buttons attached to an outgoing message, laid out row by row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: vec![buttons],
        }
    }
}

/// The chat platform as seen by the poller, the handlers and the broadcast engine.
///
/// Implementations perform exactly one request per call; timeouts and retries
/// are applied by the caller.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Long-poll for updates with ids `>= offset`, waiting at most `wait` server-side.
    async fn get_updates(&self, offset: i64, wait: Duration) -> Result<Vec<Update>>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()>;
}
