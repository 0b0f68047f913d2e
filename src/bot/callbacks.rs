use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::platform::{CallbackQuery, ChatPlatform};
use crate::retry::with_timeout;
use crate::store::SubscriberStore;

/// Payloads carried by the welcome message's buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "subscribe" => Some(Self::Subscribe),
            "unsubscribe" => Some(Self::Unsubscribe),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }

    fn subscribed(self) -> bool {
        self == Self::Subscribe
    }

    fn confirmation(self) -> &'static str {
        match self {
            Self::Subscribe => {
                "Thank you for subscribing to my hourly quotes. You will start receiving \
                 quotes from the start of next hour (Local time). \n\nI hope you enjoy the journey."
            }
            Self::Unsubscribe => {
                "No problem, you can come back to subscribe whenever. \n\nI hope you have a good day!"
            }
        }
    }
}

pub struct CallbackHandler {
    platform: Arc<dyn ChatPlatform>,
    subscribers: Arc<dyn SubscriberStore>,
    request_timeout: Duration,
}

impl CallbackHandler {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        subscribers: Arc<dyn SubscriberStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            subscribers,
            request_timeout,
        }
    }

    pub async fn handle(&self, query: &CallbackQuery) {
        // Unanswered queries leave the client's button spinning.
        if let Err(e) = with_timeout(
            self.request_timeout,
            "answerCallbackQuery",
            self.platform.answer_callback_query(&query.id),
        )
        .await
        {
            warn!("Failed to answer callback {}: {:#}", query.id, e);
        }

        let Some(chat_id) = query.origin_chat_id else {
            warn!("Received callback {} without message, dropping", query.id);
            return;
        };

        let Some(action) = SubscriptionAction::parse(&query.data) else {
            debug!(
                "Ignoring callback {} with unknown data {:?}",
                query.id, query.data
            );
            return;
        };

        match self
            .subscribers
            .set_subscribed(chat_id, action.subscribed())
            .await
        {
            Ok(true) => info!("User {} - {}", action.as_str(), chat_id),
            Ok(false) => {
                warn!(
                    "Callback {} from chat {} which never started the bot, ignoring",
                    query.id, chat_id
                );
                return;
            }
            Err(e) => {
                warn!("Failed to update subscription for {}: {:#}", chat_id, e);
                return;
            }
        }

        if let Err(e) = with_timeout(
            self.request_timeout,
            "sendMessage",
            self.platform
                .send_message(chat_id, action.confirmation(), None),
        )
        .await
        {
            warn!("Failed to confirm {} to {}: {:#}", action.as_str(), chat_id, e);
        }
    }
}
