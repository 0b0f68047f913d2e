use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub const OFFSET_KEY: &str = "telegram_offset";

/// Durable cursor of the next update id to request.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Stored cursor, or 0 when none has been written yet.
    async fn load(&self) -> Result<i64>;
    async fn save(&self, offset: i64) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteOffsetStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOffsetStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl OffsetStore for SqliteOffsetStore {
    async fn load(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM bot_config WHERE key = ?1",
                rusqlite::params![OFFSET_KEY],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read stored offset")?;

        match raw {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .with_context(|| format!("Stored {} is not an integer: {:?}", OFFSET_KEY, value)),
            None => {
                info!("No stored {} yet, starting from 0", OFFSET_KEY);
                Ok(0)
            }
        }
    }

    async fn save(&self, offset: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO bot_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![OFFSET_KEY, offset.to_string()],
        )
        .context("Failed to save offset")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    #[tokio::test]
    async fn test_load_defaults_to_zero() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.offsets().load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_upserts_single_row() {
        let db = Database::open_in_memory().unwrap();
        let store = db.offsets();

        store.save(42).await.unwrap();
        store.save(44).await.unwrap();
        assert_eq!(store.load().await.unwrap(), 44);

        let conn = db.connection();
        let conn = conn.lock().await;
        let (rows, value): (i64, String) = conn
            .query_row(
                "SELECT count(*), max(value) FROM bot_config WHERE key = ?1",
                rusqlite::params![OFFSET_KEY],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(value, "44");
    }

    #[tokio::test]
    async fn test_garbage_value_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.connection();
            let conn = conn.lock().await;
            conn.execute(
                "INSERT INTO bot_config (key, value) VALUES (?1, 'not-a-number')",
                rusqlite::params![OFFSET_KEY],
            )
            .unwrap();
        }
        assert!(db.offsets().load().await.is_err());
    }
}
