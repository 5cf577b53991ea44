//! Venue-agnostic exchange adapter trait.
//!
//! The strategy engine only ever talks to this interface. A production
//! deployment wires in the REST execution gateway (`gateway.rs`); tests and
//! paper trading use the in-memory mock (`mock.rs`).

use super::types::{OrderResult, Position, PositionSide};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Interface to a perpetuals venue for a single wallet.
///
/// All calls are bounded by the implementation's own request timeout; a stuck
/// venue must not stall the scheduler indefinitely.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// All currently open positions, grouped by token.
    async fn get_open_positions(&self) -> anyhow::Result<HashMap<String, Vec<Position>>>;

    /// Open a position with the given quote-asset notional. Leverage is
    /// applied by the venue on top of `usd_amount`.
    async fn open_position(
        &self,
        token: &str,
        side: PositionSide,
        usd_amount: Decimal,
        leverage: u32,
    ) -> anyhow::Result<OrderResult>;

    /// Close the open position for `token`. Errors if none is open.
    async fn close_position(&self, token: &str) -> anyhow::Result<OrderResult>;

    /// Spendable wallet balance in the given quote asset.
    async fn get_wallet_balance(&self, asset: &str) -> anyhow::Result<Decimal>;
}
