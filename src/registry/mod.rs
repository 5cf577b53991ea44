//! Bot registry.
//!
//! Supplies the set of active bots each scheduling round. A bot row names a
//! wallet by reference only; secret retrieval happens elsewhere.

use crate::db::SqlitePool;
use anyhow::{Context, Result};
use rusqlite::params;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, warn};

/// Policy defaults applied when a bot row leaves a horizon unset.
pub const DEFAULT_SIGNAL_HORIZON_MIN: u32 = 240;
pub const DEFAULT_KEEP_STRATEGY_HORIZON_MIN: u32 = 240;
pub const DEFAULT_BASE_ASSET: &str = "USDC";

/// Immutable configuration of one bot, valid for the lifetime of its engine
/// instance. Rebuilt when the bot is reloaded from the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_id: i64,
    /// Opaque reference to the bot's wallet; never the key material itself
    pub wallet_ref: String,
    pub token: String,
    pub leverage: u32,
    pub signal_horizon_min: u32,
    pub keep_strategy_horizon_min: u32,
    pub base_asset: String,
    /// Wallet balances above this are parked in the yield vault
    pub min_wallet_for_yield: Decimal,
}

/// SQLite-backed registry sharing the process-wide pool.
pub struct BotRegistry {
    pool: SqlitePool,
}

impl BotRegistry {
    pub fn new(pool: SqlitePool) -> Result<Self> {
        let conn = pool.get().context("Failed to acquire connection")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS bots (
                bot_id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_ref TEXT NOT NULL,
                token TEXT NOT NULL,
                leverage INTEGER NOT NULL,
                signal_horizon_min INTEGER,
                keep_strategy_horizon_min INTEGER,
                base_asset TEXT NOT NULL DEFAULT 'USDC',
                min_wallet_for_yield TEXT NOT NULL DEFAULT '0',
                is_initialized INTEGER NOT NULL DEFAULT 1,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )?;
        Ok(Self { pool })
    }

    /// All active, initialized bots. Rows failing validation are skipped
    /// with a warning rather than poisoning the whole round.
    pub fn read_bots(&self) -> Result<Vec<BotConfig>> {
        let conn = self.pool.get().context("Failed to acquire connection")?;
        let mut stmt = conn.prepare(
            "SELECT bot_id, wallet_ref, token, leverage, signal_horizon_min,
                    keep_strategy_horizon_min, base_asset, min_wallet_for_yield
             FROM bots
             WHERE is_initialized = 1 AND is_active = 1
             ORDER BY bot_id",
        )?;

        let rows: Vec<(i64, String, String, i64, Option<i64>, Option<i64>, String, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let mut bots = Vec::new();
        for (bot_id, wallet_ref, token, leverage, signal_h, keep_h, base_asset, min_yield) in rows {
            if !(1..=100).contains(&leverage) {
                warn!(bot_id, leverage, "Skipping bot with invalid leverage");
                continue;
            }
            if wallet_ref.is_empty() || token.is_empty() {
                warn!(bot_id, "Skipping bot with missing wallet or token");
                continue;
            }
            let min_wallet_for_yield = match Decimal::from_str(&min_yield) {
                Ok(v) if v >= Decimal::ZERO => v,
                _ => {
                    warn!(bot_id, %min_yield, "Skipping bot with invalid yield threshold");
                    continue;
                }
            };

            bots.push(BotConfig {
                bot_id,
                wallet_ref,
                token,
                leverage: leverage as u32,
                signal_horizon_min: signal_h
                    .map(|v| v as u32)
                    .unwrap_or(DEFAULT_SIGNAL_HORIZON_MIN),
                keep_strategy_horizon_min: keep_h
                    .map(|v| v as u32)
                    .unwrap_or(DEFAULT_KEEP_STRATEGY_HORIZON_MIN),
                base_asset,
                min_wallet_for_yield,
            });
        }

        info!(count = bots.len(), "Loaded active bots");
        Ok(bots)
    }

    /// Register a new bot and return its id.
    pub fn insert_bot(
        &self,
        wallet_ref: &str,
        token: &str,
        leverage: u32,
        keep_strategy_horizon_min: Option<u32>,
        base_asset: &str,
        min_wallet_for_yield: Decimal,
    ) -> Result<i64> {
        let conn = self.pool.get().context("Failed to acquire connection")?;
        conn.execute(
            "INSERT INTO bots (wallet_ref, token, leverage, keep_strategy_horizon_min,
                               base_asset, min_wallet_for_yield)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                wallet_ref,
                token,
                leverage,
                keep_strategy_horizon_min,
                base_asset,
                min_wallet_for_yield.to_string(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Deactivate a bot; it disappears from the next scheduling round.
    pub fn deactivate_bot(&self, bot_id: i64) -> Result<bool> {
        let conn = self.pool.get().context("Failed to acquire connection")?;
        let changed = conn.execute("UPDATE bots SET is_active = 0 WHERE bot_id = ?1", [bot_id])?;
        Ok(changed > 0)
    }
}
