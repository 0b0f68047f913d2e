use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::platform::{ChatPlatform, IncomingMessage, InlineButton, InlineKeyboard};
use crate::retry::with_timeout;
use crate::store::SubscriberStore;

use super::callbacks::SubscriptionAction;

pub const START_COMMAND: &str = "/start";

/// True for `/start` and `/start <payload>`. The group-chat form
/// `/start@name` only counts when `name` is this bot's username.
fn is_start_command(text: &str, bot_username: Option<&str>) -> bool {
    let command = text.split_whitespace().next().unwrap_or_default();
    match command.split_once('@') {
        None => command == START_COMMAND,
        Some((command, target)) => {
            command == START_COMMAND
                && bot_username
                    .map(|name| name.trim_start_matches('@'))
                    .is_some_and(|name| name.eq_ignore_ascii_case(target))
        }
    }
}

fn welcome_text(first_name: &str) -> String {
    format!(
        "Hey {}!\n\nI am Daemon Bot. I send life quotes every hour. \
         If you would love that, feel free to subscribe to me to get started.",
        first_name
    )
}

pub fn subscription_keyboard() -> InlineKeyboard {
    InlineKeyboard::single_row(vec![
        InlineButton::new("Subscribe", SubscriptionAction::Subscribe.as_str()),
        InlineButton::new("Unsubscribe", SubscriptionAction::Unsubscribe.as_str()),
    ])
}

pub struct CommandHandler {
    platform: Arc<dyn ChatPlatform>,
    subscribers: Arc<dyn SubscriberStore>,
    send_timeout: Duration,
    bot_username: Option<String>,
}

impl CommandHandler {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        subscribers: Arc<dyn SubscriberStore>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            subscribers,
            send_timeout,
            bot_username: None,
        }
    }

    /// Also answer `/start@<username>` addressed to this bot in group chats.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub async fn handle(&self, message: &IncomingMessage) {
        if !is_start_command(&message.text, self.bot_username.as_deref()) {
            debug!(
                "Ignoring message from {}: not a command we handle",
                message.sender.chat_id
            );
            return;
        }

        let sender = &message.sender;
        info!("User started - {} ({})", sender.first_name, sender.chat_id);

        if let Err(e) = self
            .subscribers
            .upsert(sender.chat_id, &sender.first_name, sender.username.as_deref())
            .await
        {
            warn!("Failed to register user {}: {:#}", sender.chat_id, e);
        }

        let keyboard = subscription_keyboard();
        let text = welcome_text(&sender.first_name);
        if let Err(e) = with_timeout(
            self.send_timeout,
            "sendMessage",
            self.platform.send_message(sender.chat_id, &text, Some(&keyboard)),
        )
        .await
        {
            warn!("Failed to send welcome to {}: {:#}", sender.chat_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use crate::testing::{sender, FakePlatform, UnreachableSubscriberStore};

    fn message(chat_id: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            sender: sender(chat_id, "Ada"),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_start_command_variants() {
        assert!(is_start_command("/start", None));
        assert!(is_start_command("  /start  ", None));
        assert!(is_start_command("/start ref-42", None));
        assert!(!is_start_command("/stop", None));
        assert!(!is_start_command("start", None));
        assert!(!is_start_command("/started", None));
        assert!(!is_start_command("", None));
    }

    #[test]
    fn test_addressed_start_only_for_this_bot() {
        assert!(is_start_command("/start@DaemonBot", Some("DaemonBot")));
        assert!(is_start_command("/start@daemonbot ref-42", Some("@DaemonBot")));
        assert!(!is_start_command("/start@SomeOtherBot", Some("DaemonBot")));
        assert!(!is_start_command("/start@SomeOtherBot", None));
        assert!(!is_start_command("/stop@DaemonBot", Some("DaemonBot")));
    }

    #[tokio::test]
    async fn test_start_for_another_bot_is_ignored() {
        let platform = Arc::new(FakePlatform::new());
        let db = Database::open_in_memory().unwrap();
        let handler = CommandHandler::new(
            platform.clone(),
            Arc::new(db.subscribers()),
            Duration::from_secs(1),
        )
        .with_bot_username("DaemonBot");

        handler.handle(&message(1001, "/start@SomeOtherBot")).await;
        assert!(platform.sent().is_empty());
        assert!(db.subscribers().get(1001).await.unwrap().is_none());

        handler.handle(&message(1001, "/start@DaemonBot")).await;
        assert_eq!(platform.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_start_registers_and_sends_welcome_with_buttons() {
        let platform = Arc::new(FakePlatform::new());
        let db = Database::open_in_memory().unwrap();
        let handler = CommandHandler::new(
            platform.clone(),
            Arc::new(db.subscribers()),
            Duration::from_secs(1),
        );

        handler.handle(&message(1001, "/start")).await;

        let user = db.subscribers().get(1001).await.unwrap().unwrap();
        assert!(!user.subscribed);

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, 1001);
        assert!(sent[0].text.starts_with("Hey Ada!"));
        let keyboard = sent[0].keyboard.clone().unwrap();
        let data: Vec<&str> = keyboard.rows[0]
            .iter()
            .map(|b| b.callback_data.as_str())
            .collect();
        assert_eq!(data, vec!["subscribe", "unsubscribe"]);
    }

    #[tokio::test]
    async fn test_repeated_start_keeps_one_row_and_flag() {
        let platform = Arc::new(FakePlatform::new());
        let db = Database::open_in_memory().unwrap();
        let store = db.subscribers();
        let handler = CommandHandler::new(
            platform.clone(),
            Arc::new(store.clone()),
            Duration::from_secs(1),
        );

        handler.handle(&message(1001, "/start")).await;
        store.set_subscribed(1001, true).await.unwrap();
        handler.handle(&message(1001, "/start")).await;

        assert!(store.get(1001).await.unwrap().unwrap().subscribed);
        let conn = db.connection();
        let conn = conn.lock().await;
        let rows: i64 = conn
            .query_row("SELECT count(*) FROM users WHERE chat_id = 1001", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_unknown_text_is_ignored() {
        let platform = Arc::new(FakePlatform::new());
        let db = Database::open_in_memory().unwrap();
        let handler = CommandHandler::new(
            platform.clone(),
            Arc::new(db.subscribers()),
            Duration::from_secs(1),
        );

        handler.handle(&message(1001, "hello there")).await;

        assert!(platform.sent().is_empty());
        assert!(db.subscribers().get(1001).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_still_sends_welcome() {
        let platform = Arc::new(FakePlatform::new());
        let handler = CommandHandler::new(
            platform.clone(),
            Arc::new(UnreachableSubscriberStore),
            Duration::from_secs(1),
        );

        handler.handle(&message(1001, "/start")).await;

        assert_eq!(platform.sent().len(), 1);
    }
}
