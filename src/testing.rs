//! In-process fakes of the external services, shared by the unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::platform::{
    CallbackQuery, ChatPlatform, IncomingMessage, InlineKeyboard, Sender, Update, UpdateKind,
};
use crate::quote::QuoteSource;
use crate::store::{OffsetStore, Subscriber, SubscriberStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

/// Scripted chat platform that records everything sent to it.
#[derive(Default)]
pub struct FakePlatform {
    polls: Mutex<VecDeque<Result<Vec<Update>>>>,
    requested_offsets: Mutex<Vec<i64>>,
    sent: Mutex<Vec<SentMessage>>,
    answered: Mutex<Vec<String>>,
    failing_chats: Mutex<HashSet<i64>>,
    fail_answers: Mutex<bool>,
    /// Cancelled once the poll script runs dry.
    cancel_when_drained: Mutex<Option<CancellationToken>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, updates: Vec<Update>) {
        self.polls.lock().unwrap().push_back(Ok(updates));
    }

    pub fn push_failure(&self, reason: &str) {
        self.polls
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(reason.to_string())));
    }

    pub fn cancel_when_drained(&self, token: CancellationToken) {
        *self.cancel_when_drained.lock().unwrap() = Some(token);
    }

    pub fn fail_sends_to(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn fail_answers(&self) {
        *self.fail_answers.lock().unwrap() = true;
    }

    pub fn requested_offsets(&self) -> Vec<i64> {
        self.requested_offsets.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn answered(&self) -> Vec<String> {
        self.answered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn get_updates(&self, offset: i64, _wait: Duration) -> Result<Vec<Update>> {
        self.requested_offsets.lock().unwrap().push(offset);
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                if let Some(token) = self.cancel_when_drained.lock().unwrap().as_ref() {
                    token.cancel();
                }
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            anyhow::bail!("Forbidden: bot was blocked by the user {}", chat_id);
        }
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()> {
        if *self.fail_answers.lock().unwrap() {
            anyhow::bail!("query is too old");
        }
        self.answered.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}

/// Offset store that records every write and can be told to fail them.
#[derive(Default)]
pub struct RecordingOffsetStore {
    saved: Mutex<Vec<i64>>,
    fail_writes: Mutex<bool>,
}

impl RecordingOffsetStore {
    pub fn failing() -> Self {
        let store = Self::default();
        *store.fail_writes.lock().unwrap() = true;
        store
    }

    pub fn saved(&self) -> Vec<i64> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl OffsetStore for RecordingOffsetStore {
    async fn load(&self) -> Result<i64> {
        Ok(self.saved.lock().unwrap().last().copied().unwrap_or(0))
    }

    async fn save(&self, offset: i64) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            anyhow::bail!("database is locked");
        }
        self.saved.lock().unwrap().push(offset);
        Ok(())
    }
}

/// Subscriber store whose reads always fail.
pub struct UnreachableSubscriberStore;

#[async_trait]
impl SubscriberStore for UnreachableSubscriberStore {
    async fn upsert(&self, _chat_id: i64, _first_name: &str, _username: Option<&str>) -> Result<()> {
        anyhow::bail!("disk I/O error")
    }

    async fn set_subscribed(&self, _chat_id: i64, _subscribed: bool) -> Result<bool> {
        anyhow::bail!("disk I/O error")
    }

    async fn subscribed_chat_ids(&self) -> Result<Vec<i64>> {
        anyhow::bail!("disk I/O error")
    }

    async fn get(&self, _chat_id: i64) -> Result<Option<Subscriber>> {
        anyhow::bail!("disk I/O error")
    }
}

/// Quote source returning a fixed answer.
pub struct FixedQuotes(pub std::result::Result<String, String>);

#[async_trait]
impl QuoteSource for FixedQuotes {
    async fn fetch_quote(&self) -> Result<String> {
        self.0.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

pub fn sender(chat_id: i64, first_name: &str) -> Sender {
    Sender {
        chat_id,
        first_name: first_name.to_string(),
        username: None,
    }
}

pub fn text_update(id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        id,
        kind: UpdateKind::Message(IncomingMessage {
            sender: sender(chat_id, "Ada"),
            text: text.to_string(),
        }),
    }
}

pub fn callback_update(id: i64, chat_id: Option<i64>, data: &str) -> Update {
    Update {
        id,
        kind: UpdateKind::Callback(CallbackQuery {
            id: format!("cb-{}", id),
            data: data.to_string(),
            origin_chat_id: chat_id,
        }),
    }
}
