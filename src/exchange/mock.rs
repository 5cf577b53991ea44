//! In-memory exchange for paper trading and tests.
//!
//! Tracks a single wallet balance and one position per token, and counts
//! every adapter call so tests can assert that a cycle issued exactly the
//! exchange traffic it was supposed to.

use super::traits::ExchangeAdapter;
use super::types::{OrderResult, Position, PositionSide};
use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Default)]
struct MockExchangeState {
    balance: Decimal,
    positions: HashMap<String, Vec<Position>>,
}

/// Simulated venue backed by in-memory state.
pub struct MockExchange {
    state: RwLock<MockExchangeState>,
    order_id_counter: AtomicU64,
    open_calls: AtomicU64,
    close_calls: AtomicU64,
    position_queries: AtomicU64,
    fail_orders: AtomicBool,
}

impl MockExchange {
    pub fn new(balance: Decimal) -> Self {
        Self {
            state: RwLock::new(MockExchangeState {
                balance,
                positions: HashMap::new(),
            }),
            order_id_counter: AtomicU64::new(1),
            open_calls: AtomicU64::new(0),
            close_calls: AtomicU64::new(0),
            position_queries: AtomicU64::new(0),
            fail_orders: AtomicBool::new(false),
        }
    }

    /// Make subsequent open/close calls fail, simulating a venue outage.
    pub fn fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    /// Seed an open position directly, bypassing order flow.
    pub async fn set_position(&self, position: Position) {
        let mut state = self.state.write().await;
        state
            .positions
            .entry(position.token.clone())
            .or_default()
            .push(position);
    }

    pub async fn set_balance(&self, balance: Decimal) {
        self.state.write().await.balance = balance;
    }

    pub async fn balance(&self) -> Decimal {
        self.state.read().await.balance
    }

    pub async fn position_for(&self, token: &str) -> Option<Position> {
        self.state
            .read()
            .await
            .positions
            .get(token)
            .and_then(|p| p.first().cloned())
    }

    /// Total adapter traffic: order placements plus position queries.
    pub fn exchange_calls(&self) -> u64 {
        self.open_calls.load(Ordering::SeqCst)
            + self.close_calls.load(Ordering::SeqCst)
            + self.position_queries.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> u64 {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u64 {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn next_order_id(&self) -> String {
        format!("mock-{}", self.order_id_counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ExchangeAdapter for MockExchange {
    async fn get_open_positions(&self) -> Result<HashMap<String, Vec<Position>>> {
        self.position_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.read().await.positions.clone())
    }

    async fn open_position(
        &self,
        token: &str,
        side: PositionSide,
        usd_amount: Decimal,
        leverage: u32,
    ) -> Result<OrderResult> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_orders.load(Ordering::SeqCst) {
            bail!("simulated venue outage");
        }
        if usd_amount <= Decimal::ZERO {
            bail!("order notional must be positive, got {}", usd_amount);
        }

        let mut state = self.state.write().await;
        if state.balance < usd_amount {
            bail!(
                "insufficient balance: needed {} but wallet holds {}",
                usd_amount,
                state.balance
            );
        }
        if state.positions.get(token).map_or(false, |p| !p.is_empty()) {
            bail!("position already open for {}", token);
        }

        state.balance -= usd_amount;
        state.positions.entry(token.to_string()).or_default().push(Position {
            token: token.to_string(),
            side,
            size_usd: usd_amount,
            entry_price: Decimal::ONE,
            mark_price: Decimal::ONE,
        });

        info!(%token, %side, %usd_amount, leverage, "Mock position opened");
        Ok(OrderResult {
            order_id: self.next_order_id(),
            token: token.to_string(),
            side,
            usd_amount,
        })
    }

    async fn close_position(&self, token: &str) -> Result<OrderResult> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_orders.load(Ordering::SeqCst) {
            bail!("simulated venue outage");
        }

        let mut state = self.state.write().await;
        let position = match state.positions.get_mut(token).and_then(|p| p.pop()) {
            Some(position) => position,
            None => bail!("no open position for {}", token),
        };
        state.positions.remove(token);
        // Collateral returns to the wallet at face value; PnL modelling is
        // not the mock's job.
        state.balance += position.size_usd;

        info!(%token, side = %position.side, size = %position.size_usd, "Mock position closed");
        Ok(OrderResult {
            order_id: self.next_order_id(),
            token: token.to_string(),
            side: position.side,
            usd_amount: position.size_usd,
        })
    }

    async fn get_wallet_balance(&self, _asset: &str) -> Result<Decimal> {
        Ok(self.state.read().await.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_open_then_close_round_trips_balance() {
        let exchange = MockExchange::new(dec!(1000));

        exchange
            .open_position("ETH", PositionSide::Long, dec!(1000), 3)
            .await
            .unwrap();
        assert_eq!(exchange.balance().await, dec!(0));
        assert!(exchange.position_for("ETH").await.is_some());

        exchange.close_position("ETH").await.unwrap();
        assert_eq!(exchange.balance().await, dec!(1000));
        assert!(exchange.position_for("ETH").await.is_none());
    }

    #[tokio::test]
    async fn test_close_without_position_errors() {
        let exchange = MockExchange::new(dec!(100));
        assert!(exchange.close_position("ETH").await.is_err());
        assert_eq!(exchange.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_double_open_rejected() {
        let exchange = MockExchange::new(dec!(1000));
        exchange
            .open_position("ETH", PositionSide::Long, dec!(500), 2)
            .await
            .unwrap();
        assert!(exchange
            .open_position("ETH", PositionSide::Short, dec!(500), 2)
            .await
            .is_err());
    }
}
