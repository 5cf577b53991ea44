//! Append-only audit event log.
//!
//! Every reconciliation branch taken is recorded with the signal and the
//! position snapshot that led to it, so any past decision can be replayed
//! from the table alone. Log failures never roll back an action that was
//! already sent to the exchange.

use crate::db::SqlitePool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tokio::sync::Mutex;
use tracing::debug;

/// Append-only sink for audit events.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn insert_event(
        &self,
        bot_id: i64,
        event_name: &str,
        event_data: serde_json::Value,
    ) -> Result<()>;
}

/// A persisted audit event.
#[derive(Debug, Clone)]
pub struct BotEvent {
    pub id: i64,
    pub bot_id: i64,
    pub event_name: String,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed event log sharing the process-wide pool.
pub struct SqliteEventLog {
    pool: SqlitePool,
}

impl SqliteEventLog {
    pub fn new(pool: SqlitePool) -> Result<Self> {
        let conn = pool.get().context("Failed to acquire connection")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS bot_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id INTEGER NOT NULL,
                event_name TEXT NOT NULL,
                event_data TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bot_events_bot ON bot_events(bot_id);
            CREATE INDEX IF NOT EXISTS idx_bot_events_created ON bot_events(created_at);
            "#,
        )?;
        Ok(Self { pool })
    }

    /// Most recent events, optionally restricted to one bot.
    pub fn recent_events(&self, bot_id: Option<i64>, limit: usize) -> Result<Vec<BotEvent>> {
        let conn = self.pool.get().context("Failed to acquire connection")?;
        let limit = limit as i64;

        let (sql, bound): (&str, Vec<&dyn rusqlite::ToSql>) = match &bot_id {
            Some(id) => (
                "SELECT id, bot_id, event_name, event_data, created_at
                 FROM bot_events WHERE bot_id = ?1
                 ORDER BY id DESC LIMIT ?2",
                vec![id, &limit],
            ),
            None => (
                "SELECT id, bot_id, event_name, event_data, created_at
                 FROM bot_events ORDER BY id DESC LIMIT ?1",
                vec![&limit],
            ),
        };

        let mut stmt = conn.prepare(sql)?;
        let events = stmt
            .query_map(bound.as_slice(), |row| {
                let data: String = row.get(3)?;
                let created: String = row.get(4)?;
                Ok(BotEvent {
                    id: row.get(0)?,
                    bot_id: row.get(1)?,
                    event_name: row.get(2)?,
                    event_data: serde_json::from_str(&data)
                        .unwrap_or(serde_json::Value::Null),
                    created_at: DateTime::parse_from_rfc3339(&created)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(events)
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn insert_event(
        &self,
        bot_id: i64,
        event_name: &str,
        event_data: serde_json::Value,
    ) -> Result<()> {
        let pool = self.pool.clone();
        let event_name = event_name.to_string();

        // rusqlite is blocking; keep it off the async worker threads.
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().context("Failed to acquire connection")?;
            conn.execute(
                "INSERT INTO bot_events (bot_id, event_name, event_data, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    bot_id,
                    event_name,
                    event_data.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to insert event")?;
            debug!(bot_id, %event_name, "Audit event recorded");
            Ok(())
        })
        .await
        .context("Event insert task panicked")?
    }
}

/// In-memory event sink for tests; keeps events in insertion order.
#[derive(Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<(i64, String, serde_json::Value)>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<(i64, String, serde_json::Value)> {
        self.events.lock().await.clone()
    }

    pub async fn event_names(&self) -> Vec<String> {
        self.events.lock().await.iter().map(|(_, n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn insert_event(
        &self,
        bot_id: i64,
        event_name: &str,
        event_data: serde_json::Value,
    ) -> Result<()> {
        self.events
            .lock()
            .await
            .push((bot_id, event_name.to_string(), event_data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let log = SqliteEventLog::new(open_memory_pool().unwrap()).unwrap();

        log.insert_event(1, "open_long", json!({"size": "100"}))
            .await
            .unwrap();
        log.insert_event(2, "keep_same_side", json!({}))
            .await
            .unwrap();
        log.insert_event(1, "stale_signal_close", json!({"side": "long"}))
            .await
            .unwrap();

        let all = log.recent_events(None, 10).unwrap();
        assert_eq!(all.len(), 3);
        // Newest first.
        assert_eq!(all[0].event_name, "stale_signal_close");

        let bot1 = log.recent_events(Some(1), 10).unwrap();
        assert_eq!(bot1.len(), 2);
        assert!(bot1.iter().all(|e| e.bot_id == 1));
        assert_eq!(bot1[1].event_data["size"], "100");
    }
}
