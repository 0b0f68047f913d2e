use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    CallbackQuery, ChatPlatform, IncomingMessage, InlineKeyboard, Sender, Update, UpdateKind,
};

/// Telegram Bot API client speaking plain HTTP+JSON.
pub struct TelegramClient {
    client: reqwest::Client,
    /// `<api_base_url>/bot<token>`
    endpoint: String,
}

impl TelegramClient {
    pub fn new(api_base_url: &str, bot_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/bot{}", api_base_url.trim_end_matches('/'), bot_token),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.endpoint, method)
    }

    async fn post<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", method))?;
        decode_response(method, status, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Turn a Bot API reply into its `result`, treating non-2xx and `ok:false` as errors.
fn decode_response<T: DeserializeOwned>(
    method: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> Result<T> {
    if !status.is_success() {
        anyhow::bail!("Telegram {} error ({}): {}", method, status, body.trim());
    }

    let parsed: ApiResponse<T> = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse Telegram {} response", method))?;

    if !parsed.ok {
        anyhow::bail!(
            "Telegram {} returned ok=false: {}",
            method,
            parsed.description.unwrap_or_default()
        );
    }

    parsed
        .result
        .with_context(|| format!("Telegram {} response has no result", method))
}

// Wire types. Only the fields this bot reads are declared.

#[derive(Debug, Deserialize)]
struct WireUpdate {
    update_id: i64,
    message: Option<WireMessage>,
    callback_query: Option<WireCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    chat: WireChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
    first_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCallbackQuery {
    id: String,
    data: Option<String>,
    message: Option<WireMessage>,
}

impl From<WireUpdate> for Update {
    fn from(wire: WireUpdate) -> Self {
        let kind = if let Some(message) = wire.message {
            UpdateKind::Message(IncomingMessage {
                sender: Sender {
                    chat_id: message.chat.id,
                    first_name: message.chat.first_name.unwrap_or_default(),
                    username: message.chat.username,
                },
                text: message.text.unwrap_or_default(),
            })
        } else if let Some(query) = wire.callback_query {
            UpdateKind::Callback(CallbackQuery {
                id: query.id,
                data: query.data.unwrap_or_default(),
                origin_chat_id: query.message.map(|m| m.chat.id),
            })
        } else {
            UpdateKind::Other
        };

        Update {
            id: wire.update_id,
            kind,
        }
    }
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<WireReplyMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct WireReplyMarkup<'a> {
    inline_keyboard: Vec<Vec<WireInlineButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct WireInlineButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

impl<'a> From<&'a InlineKeyboard> for WireReplyMarkup<'a> {
    fn from(keyboard: &'a InlineKeyboard) -> Self {
        WireReplyMarkup {
            inline_keyboard: keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| WireInlineButton {
                            text: &b.label,
                            callback_data: &b.callback_data,
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn get_updates(&self, offset: i64, wait: Duration) -> Result<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: wait.as_secs(),
            allowed_updates: ["message", "callback_query"],
        };
        let updates: Vec<WireUpdate> = self.post("getUpdates", &request).await?;
        debug!("getUpdates(offset={}) returned {} update(s)", offset, updates.len());
        Ok(updates.into_iter().map(Update::from).collect())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_markup: keyboard.map(WireReplyMarkup::from),
        };
        let _: serde_json::Value = self.post("sendMessage", &request).await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()> {
        let request = AnswerCallbackRequest {
            callback_query_id: callback_id,
        };
        let _: bool = self.post("answerCallbackQuery", &request).await?;
        Ok(())
    }
}
