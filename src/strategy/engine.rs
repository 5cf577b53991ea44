//! Strategy engine: one reconciliation cycle per bot per tick.
//!
//! The cycle is strictly sequential: fetch signals, fold them into the
//! freshness tracker, read the on-exchange position, reconcile, execute the
//! resulting action, audit. Freshness is updated only after a successful
//! fetch and never rolled back by a later failure, so staleness accounting
//! survives exchange outages.

use crate::error::CycleError;
use crate::events::EventLog;
use crate::exchange::{ExchangeAdapter, Position, PositionSide};
use crate::registry::BotConfig;
use crate::signal::{FreshnessTracker, Signal, SignalProvider};
use crate::strategy::rebalancer::CapitalRebalancer;
use crate::strategy::reconciler::{reconcile, Action, Decision};
use crate::vault::YieldVault;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Per-bot execution engine. Owns the bot's freshness state; everything else
/// is an injected collaborator.
pub struct StrategyEngine {
    config: BotConfig,
    signals: Arc<dyn SignalProvider>,
    exchange: Arc<dyn ExchangeAdapter>,
    rebalancer: CapitalRebalancer,
    events: Arc<dyn EventLog>,
    freshness: FreshnessTracker,
}

impl StrategyEngine {
    pub fn new(
        config: BotConfig,
        signals: Arc<dyn SignalProvider>,
        exchange: Arc<dyn ExchangeAdapter>,
        vault: Arc<dyn YieldVault>,
        events: Arc<dyn EventLog>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            config,
            signals,
            exchange,
            rebalancer: CapitalRebalancer::new(vault, settle_delay),
            events,
            freshness: FreshnessTracker::new(Utc::now()),
        }
    }

    pub fn bot_id(&self) -> i64 {
        self.config.bot_id
    }

    /// Run one full cycle. Any error aborts the remaining steps for this bot
    /// only; the caller catches it at the cycle boundary.
    pub async fn run_cycle(&mut self) -> Result<Action, CycleError> {
        let bot_id = self.config.bot_id;
        let token = self.config.token.clone();
        let started = std::time::Instant::now();

        let batch = self
            .signals
            .get_signals(&token)
            .await
            .map_err(CycleError::SignalFetch)?;

        // Freshness folds in the whole batch, not just the newest entry.
        let state = self.freshness.update(&batch);

        let signal = match batch.last() {
            Some(signal) => signal.clone(),
            None => return Err(CycleError::MissingSignal { token }),
        };

        // Ambiguity aborts before any exchange traffic, position query
        // included.
        if signal.is_ambiguous() {
            let err = CycleError::AmbiguousSignal {
                symbol: signal.symbol.clone(),
            };
            self.audit(err.kind(), &signal, None, json!({"error": err.to_string()}))
                .await;
            return Err(err);
        }

        let positions = self
            .exchange
            .get_open_positions()
            .await
            .map_err(|e| CycleError::ExchangeCall {
                op: "get_open_positions",
                source: e,
            })?;

        let token_positions = positions.get(&token).map(Vec::as_slice).unwrap_or(&[]);
        if token_positions.len() > 1 {
            warn!(
                bot_id,
                %token,
                count = token_positions.len(),
                "Exchange reported multiple positions; treating the first as authoritative"
            );
        }
        let position = token_positions.first();

        let decision = reconcile(&signal, position, &state, &self.config, Utc::now())?;

        info!(
            bot_id,
            %token,
            branch = decision.branch,
            action = decision.action.name(),
            position = position.map(|p| p.side.as_str()).unwrap_or("none"),
            "Reconciled"
        );

        let position_snapshot = position.cloned();
        match self.execute(&decision, position.is_some()).await {
            Ok(()) => {
                self.audit(
                    decision.branch,
                    &signal,
                    position_snapshot.as_ref(),
                    json!({"action": decision.action.name()}),
                )
                .await;
            }
            Err(e) => {
                self.audit(
                    e.kind(),
                    &signal,
                    position_snapshot.as_ref(),
                    json!({"action": decision.action.name(), "error": e.to_string()}),
                )
                .await;
                return Err(e);
            }
        }

        info!(
            bot_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cycle finished"
        );
        Ok(decision.action)
    }

    /// Drive the decided action through the exchange.
    async fn execute(&self, decision: &Decision, had_position: bool) -> Result<(), CycleError> {
        match decision.action {
            Action::OpenPosition(side) => {
                // Opening from flat: recall vaulted capital first so the
                // balance read below sees it.
                if !had_position {
                    self.rebalancer.withdraw_for_entry(&self.config).await;
                }
                self.open_with_full_balance(side).await
            }
            Action::ClosePosition => {
                self.close().await?;
                self.deposit_check().await;
                Ok(())
            }
            Action::FlipPosition(side) => {
                // Close first; the freed collateral funds the opposite side.
                self.close().await?;
                self.open_with_full_balance(side).await
            }
            Action::KeepPosition | Action::Idle => Ok(()),
        }
    }

    /// Full-balance sizing: the whole spendable quote balance goes into the
    /// order; the venue applies leverage on top.
    async fn open_with_full_balance(&self, side: PositionSide) -> Result<(), CycleError> {
        let balance = self
            .exchange
            .get_wallet_balance(&self.config.base_asset)
            .await
            .map_err(|e| CycleError::ExchangeCall {
                op: "get_wallet_balance",
                source: e,
            })?;

        let result = self
            .exchange
            .open_position(&self.config.token, side, balance, self.config.leverage)
            .await
            .map_err(|e| CycleError::ExchangeCall {
                op: "open_position",
                source: e,
            })?;

        info!(
            bot_id = self.config.bot_id,
            token = %self.config.token,
            %side,
            notional = %result.usd_amount,
            leverage = self.config.leverage,
            order_id = %result.order_id,
            "Position opened"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), CycleError> {
        let result = self
            .exchange
            .close_position(&self.config.token)
            .await
            .map_err(|e| CycleError::ExchangeCall {
                op: "close_position",
                source: e,
            })?;

        info!(
            bot_id = self.config.bot_id,
            token = %self.config.token,
            side = %result.side,
            order_id = %result.order_id,
            "Position closed"
        );
        Ok(())
    }

    /// After a close the wallet holds the freed collateral; park it in the
    /// vault if it clears the bot's threshold. Best-effort end to end.
    async fn deposit_check(&self) {
        let balance = match self
            .exchange
            .get_wallet_balance(&self.config.base_asset)
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                warn!(
                    bot_id = self.config.bot_id,
                    error = %e,
                    "Balance read after close failed; skipping deposit check"
                );
                return;
            }
        };
        self.rebalancer.maybe_deposit(balance, &self.config).await;
    }

    /// Append an audit event. The action has already happened, so a failed
    /// insert is an error log, never a rollback.
    async fn audit(
        &self,
        event_name: &str,
        signal: &Signal,
        position: Option<&Position>,
        extra: serde_json::Value,
    ) {
        let mut event_data = json!({
            "signal": signal,
            "position": position.map(|p| json!({
                "side": p.side.as_str(),
                "size_usd": p.size_usd,
            })),
        });
        if let (Some(data), Some(extra)) = (event_data.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                data.insert(k.clone(), v.clone());
            }
        }

        if let Err(e) = self
            .events
            .insert_event(self.config.bot_id, event_name, event_data)
            .await
        {
            error!(
                bot_id = self.config.bot_id,
                %event_name,
                error = %e,
                "Failed to record audit event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventLog;
    use crate::exchange::MockExchange;
    use crate::vault::MockVault;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    /// Scripted provider: hands out one canned batch (or error) per call.
    struct ScriptedSignals {
        batches: Mutex<Vec<anyhow::Result<Vec<Signal>>>>,
    }

    impl ScriptedSignals {
        fn new(batches: Vec<anyhow::Result<Vec<Signal>>>) -> Self {
            Self {
                batches: Mutex::new(batches),
            }
        }

        fn once(batch: Vec<Signal>) -> Self {
            Self::new(vec![Ok(batch)])
        }
    }

    #[async_trait]
    impl SignalProvider for ScriptedSignals {
        async fn get_signals(&self, _token: &str) -> anyhow::Result<Vec<Signal>> {
            self.batches
                .lock()
                .await
                .remove(0)
        }
    }

    fn signal(long: bool, short: bool) -> Signal {
        Signal {
            symbol: "ETH".to_string(),
            long,
            short,
            horizon_min: 240,
            stop_loss_pct: dec!(5),
            take_profit_pct: dec!(10),
            prediction_time: Utc::now(),
        }
    }

    fn config(keep_horizon_min: u32) -> BotConfig {
        BotConfig {
            bot_id: 7,
            wallet_ref: "wallet-7".to_string(),
            token: "ETH".to_string(),
            leverage: 3,
            signal_horizon_min: 240,
            keep_strategy_horizon_min: keep_horizon_min,
            base_asset: "USDC".to_string(),
            min_wallet_for_yield: dec!(100),
        }
    }

    struct Harness {
        exchange: Arc<MockExchange>,
        vault: Arc<MockVault>,
        events: Arc<MemoryEventLog>,
        engine: StrategyEngine,
    }

    fn harness(batch: Vec<Signal>, keep_horizon_min: u32, balance: Decimal) -> Harness {
        harness_with(ScriptedSignals::once(batch), keep_horizon_min, balance)
    }

    fn harness_with(
        signals: ScriptedSignals,
        keep_horizon_min: u32,
        balance: Decimal,
    ) -> Harness {
        let exchange = Arc::new(MockExchange::new(balance));
        let vault = Arc::new(MockVault::new());
        let events = Arc::new(MemoryEventLog::new());
        let engine = StrategyEngine::new(
            config(keep_horizon_min),
            Arc::new(signals),
            exchange.clone(),
            vault.clone(),
            events.clone(),
            Duration::ZERO,
        );
        Harness {
            exchange,
            vault,
            events,
            engine,
        }
    }

    async fn seed_long(exchange: &MockExchange, entry: Decimal, mark: Decimal) {
        exchange
            .set_position(Position {
                token: "ETH".to_string(),
                side: PositionSide::Long,
                size_usd: dec!(1000),
                entry_price: entry,
                mark_price: mark,
            })
            .await;
    }

    #[tokio::test]
    async fn test_open_from_flat_uses_full_balance_and_recalls_vault() {
        let mut h = harness(vec![signal(true, false)], 240, dec!(750));

        let action = h.engine.run_cycle().await.unwrap();

        assert_eq!(action, Action::OpenPosition(PositionSide::Long));
        // Vault recalled before the balance read.
        assert_eq!(h.vault.withdrawals(), 1);
        // Entire wallet committed to the order.
        let position = h.exchange.position_for("ETH").await.unwrap();
        assert_eq!(position.size_usd, dec!(750));
        assert_eq!(h.exchange.balance().await, dec!(0));
        assert_eq!(h.events.event_names().await, vec!["open_long"]);
    }

    #[tokio::test]
    async fn test_flip_closes_then_reopens_without_vault_withdrawal() {
        let h = harness(vec![signal(false, true)], 240, dec!(0));
        seed_long(&h.exchange, dec!(100), dec!(101)).await;
        let mut engine = h.engine;

        let action = engine.run_cycle().await.unwrap();

        assert_eq!(action, Action::FlipPosition(PositionSide::Short));
        assert_eq!(h.exchange.close_calls(), 1);
        assert_eq!(h.exchange.open_calls(), 1);
        let position = h.exchange.position_for("ETH").await.unwrap();
        assert_eq!(position.side, PositionSide::Short);
        // The freed collateral funds the new side in full.
        assert_eq!(position.size_usd, dec!(1000));
        // Withdrawal only happens when opening from flat.
        assert_eq!(h.vault.withdrawals(), 0);
    }

    #[tokio::test]
    async fn test_stop_loss_close_then_deposit_check() {
        // Neutral signal; the mark is through the 5% stop.
        let h = harness(vec![signal(false, false)], 240, dec!(0));
        seed_long(&h.exchange, dec!(100), dec!(94)).await;
        let mut engine = h.engine;

        let action = engine.run_cycle().await.unwrap();

        assert_eq!(action, Action::ClosePosition);
        assert!(h.exchange.position_for("ETH").await.is_none());
        // Freed collateral (1000) clears the 100 threshold.
        assert_eq!(h.vault.deposits(), 1);
        assert_eq!(h.events.event_names().await, vec!["stop_loss_exit"]);
    }

    #[tokio::test]
    async fn test_ambiguous_signal_makes_zero_exchange_calls() {
        let mut h = harness(vec![signal(true, true)], 240, dec!(500));

        let err = h.engine.run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::AmbiguousSignal { .. }));
        assert_eq!(h.exchange.exchange_calls(), 0);
        assert_eq!(h.events.event_names().await, vec!["ambiguous_signal"]);
    }

    #[tokio::test]
    async fn test_signal_fetch_error_aborts_before_any_exchange_call() {
        let mut h = harness_with(
            ScriptedSignals::new(vec![Err(anyhow!("connection refused"))]),
            240,
            dec!(500),
        );

        let err = h.engine.run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::SignalFetch(_)));
        assert_eq!(h.exchange.exchange_calls(), 0);
        assert!(h.events.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_missing_signal() {
        let mut h = harness(vec![], 240, dec!(500));

        let err = h.engine.run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::MissingSignal { .. }));
        assert_eq!(h.exchange.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn test_exchange_outage_aborts_cycle_and_is_audited() {
        let h = harness(vec![signal(false, true)], 240, dec!(0));
        seed_long(&h.exchange, dec!(100), dec!(101)).await;
        h.exchange.fail_orders(true);
        let mut engine = h.engine;

        let err = engine.run_cycle().await.unwrap_err();

        assert!(matches!(
            err,
            CycleError::ExchangeCall { op: "close_position", .. }
        ));
        assert_eq!(h.events.event_names().await, vec!["exchange_call_error"]);
        // No deposit was attempted after the failed close.
        assert_eq!(h.vault.deposits(), 0);
    }

    #[tokio::test]
    async fn test_stale_position_closed_after_horizon_lapses() {
        // Keep-horizon of zero: any elapsed time past engine construction
        // counts as stale.
        let h = harness(vec![signal(false, false)], 0, dec!(0));
        seed_long(&h.exchange, dec!(100), dec!(101)).await;
        let mut engine = h.engine;

        tokio::time::sleep(Duration::from_millis(10)).await;
        let action = engine.run_cycle().await.unwrap();

        assert_eq!(action, Action::ClosePosition);
        assert_eq!(h.events.event_names().await, vec!["stale_signal_close"]);
    }

    #[tokio::test]
    async fn test_matching_signal_keeps_and_places_no_orders() {
        let h = harness(vec![signal(true, false)], 240, dec!(0));
        seed_long(&h.exchange, dec!(100), dec!(101)).await;
        let mut engine = h.engine;

        let action = engine.run_cycle().await.unwrap();

        assert_eq!(action, Action::KeepPosition);
        assert_eq!(h.exchange.open_calls(), 0);
        assert_eq!(h.exchange.close_calls(), 0);
        assert_eq!(h.events.event_names().await, vec!["keep_same_side"]);
    }

    #[tokio::test]
    async fn test_directional_flag_earlier_in_batch_refreshes_staleness() {
        // The newest entry is neutral but an earlier one carries the long
        // flag; the batch scan must keep the position alive.
        let newest = signal(false, false);
        let mut older = signal(true, false);
        older.prediction_time = newest.prediction_time - chrono::Duration::seconds(30);

        let h = harness(vec![older, newest], 1, dec!(0));
        seed_long(&h.exchange, dec!(100), dec!(101)).await;
        let mut engine = h.engine;

        let action = engine.run_cycle().await.unwrap();
        assert_eq!(action, Action::KeepPosition);
        assert_eq!(h.events.event_names().await, vec!["keep_within_horizon"]);
    }

    #[tokio::test]
    async fn test_first_of_multiple_positions_is_authoritative() {
        let h = harness(vec![signal(true, false)], 240, dec!(0));
        seed_long(&h.exchange, dec!(100), dec!(101)).await;
        h.exchange
            .set_position(Position {
                token: "ETH".to_string(),
                side: PositionSide::Short,
                size_usd: dec!(10),
                entry_price: dec!(100),
                mark_price: dec!(101),
            })
            .await;
        let mut engine = h.engine;

        // Long signal against the authoritative (first, long) position.
        let action = engine.run_cycle().await.unwrap();
        assert_eq!(action, Action::KeepPosition);
    }
}
