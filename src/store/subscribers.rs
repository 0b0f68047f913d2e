use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub struct Subscriber {
    pub chat_id: i64,
    pub first_name: String,
    pub username: Option<String>,
    pub subscribed: bool,
}

/// Registry of everyone who has started the bot.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Insert with `subscribed = false`, or refresh name fields of an existing
    /// row. The subscribed flag of an existing row is never touched.
    async fn upsert(&self, chat_id: i64, first_name: &str, username: Option<&str>) -> Result<()>;

    /// Set the flag; returns false when no row exists for `chat_id`.
    async fn set_subscribed(&self, chat_id: i64, subscribed: bool) -> Result<bool>;

    /// Chat ids with the flag set, in insertion order.
    async fn subscribed_chat_ids(&self) -> Result<Vec<i64>>;

    #[allow(dead_code)]
    async fn get(&self, chat_id: i64) -> Result<Option<Subscriber>>;
}

#[derive(Clone)]
pub struct SqliteSubscriberStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSubscriberStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SubscriberStore for SqliteSubscriberStore {
    async fn upsert(&self, chat_id: i64, first_name: &str, username: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (chat_id, first_name, username, subscribed)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(chat_id) DO UPDATE
             SET first_name = excluded.first_name,
                 username = excluded.username,
                 updated_at = datetime('now')",
            rusqlite::params![chat_id, first_name, username],
        )
        .context("Failed to upsert user")?;
        Ok(())
    }

    async fn set_subscribed(&self, chat_id: i64, subscribed: bool) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE users SET subscribed = ?1, updated_at = datetime('now')
                 WHERE chat_id = ?2",
                rusqlite::params![subscribed, chat_id],
            )
            .context("Failed to update user subscription")?;
        Ok(changed > 0)
    }

    async fn subscribed_chat_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT chat_id FROM users WHERE subscribed = 1 ORDER BY id ASC")
            .context("Failed to prepare subscribed users query")?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to query subscribed users")?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .context("Failed to collect subscribed users")?;
        Ok(ids)
    }

    async fn get(&self, chat_id: i64) -> Result<Option<Subscriber>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT chat_id, first_name, username, subscribed FROM users WHERE chat_id = ?1",
            rusqlite::params![chat_id],
            |row| {
                Ok(Subscriber {
                    chat_id: row.get(0)?,
                    first_name: row.get(1)?,
                    username: row.get(2)?,
                    subscribed: row.get(3)?,
                })
            },
        )
        .optional()
        .context("Failed to load user")
    }
}
