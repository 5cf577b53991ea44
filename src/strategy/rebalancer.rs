//! Idle-capital rebalancing around position transitions.
//!
//! Between positions the wallet's quote balance earns nothing, so anything
//! above the bot's threshold is parked in the yield vault. Vault traffic is
//! best-effort: a failed deposit or withdrawal degrades to a warning and the
//! cycle carries on.

use crate::registry::BotConfig;
use crate::vault::YieldVault;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Whether a wallet balance is worth depositing. Pure so the threshold rule
/// can be tested without a vault.
pub fn should_deposit(wallet_balance: Decimal, config: &BotConfig) -> bool {
    wallet_balance > config.min_wallet_for_yield
}

/// Moves idle capital into and out of the yield vault.
pub struct CapitalRebalancer {
    vault: Arc<dyn YieldVault>,
    /// Wait after a withdrawal before trusting the wallet balance again;
    /// balance visibility after an on-chain transfer lags.
    settle_delay: Duration,
}

impl CapitalRebalancer {
    pub fn new(vault: Arc<dyn YieldVault>, settle_delay: Duration) -> Self {
        Self { vault, settle_delay }
    }

    /// Deposit the wallet balance if it exceeds the bot's threshold.
    /// Returns whether a deposit was attempted. Fire-and-forget: failure is
    /// logged and never aborts the cycle.
    pub async fn maybe_deposit(&self, wallet_balance: Decimal, config: &BotConfig) -> bool {
        if !should_deposit(wallet_balance, config) {
            return false;
        }

        info!(
            bot_id = config.bot_id,
            balance = %wallet_balance,
            threshold = %config.min_wallet_for_yield,
            "Depositing idle balance into yield vault"
        );
        if let Err(e) = self.vault.deposit(&config.wallet_ref, wallet_balance).await {
            warn!(bot_id = config.bot_id, error = %e, "Vault deposit failed; continuing");
        }
        true
    }

    /// Recall vaulted capital before opening a position from a flat state,
    /// then wait out the settlement delay so the subsequent balance read
    /// sees the withdrawn funds.
    pub async fn withdraw_for_entry(&self, config: &BotConfig) {
        if let Err(e) = self.vault.withdraw(&config.wallet_ref).await {
            warn!(bot_id = config.bot_id, error = %e, "Vault withdrawal failed; continuing");
            return;
        }

        info!(
            bot_id = config.bot_id,
            delay_secs = self.settle_delay.as_secs(),
            "Vault withdrawal requested; waiting for balance to settle"
        );
        tokio::time::sleep(self.settle_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MockVault;
    use rust_decimal_macros::dec;

    fn config(min_wallet_for_yield: Decimal) -> BotConfig {
        BotConfig {
            bot_id: 1,
            wallet_ref: "wallet-1".to_string(),
            token: "ETH".to_string(),
            leverage: 3,
            signal_horizon_min: 240,
            keep_strategy_horizon_min: 240,
            base_asset: "USDC".to_string(),
            min_wallet_for_yield,
        }
    }

    #[test]
    fn test_should_deposit_is_a_strict_threshold() {
        let cfg = config(dec!(100));
        assert!(!should_deposit(dec!(100), &cfg));
        assert!(!should_deposit(dec!(50), &cfg));
        assert!(should_deposit(dec!(100.01), &cfg));
    }

    #[tokio::test]
    async fn test_deposit_skipped_below_threshold() {
        let vault = Arc::new(MockVault::new());
        let rebalancer = CapitalRebalancer::new(vault.clone(), Duration::ZERO);

        assert!(!rebalancer.maybe_deposit(dec!(10), &config(dec!(100))).await);
        assert_eq!(vault.deposits(), 0);

        assert!(rebalancer.maybe_deposit(dec!(500), &config(dec!(100))).await);
        assert_eq!(vault.deposits(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_for_entry_hits_the_vault() {
        let vault = Arc::new(MockVault::new());
        let rebalancer = CapitalRebalancer::new(vault.clone(), Duration::ZERO);

        rebalancer.withdraw_for_entry(&config(dec!(100))).await;
        assert_eq!(vault.withdrawals(), 1);
    }
}
