//! Yield vault client.
//!
//! Idle quote-asset capital is parked in an external yield facility between
//! positions. Both operations are best-effort and idempotent from our side:
//! the vault service owns the on-chain transfer and its retries.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument};

/// External facility holding idle collateral between positions.
#[async_trait]
pub trait YieldVault: Send + Sync {
    /// Move `amount` of idle quote asset from the wallet into the vault.
    async fn deposit(&self, wallet_ref: &str, amount: Decimal) -> Result<()>;

    /// Pull the wallet's entire vault balance back out. Wallet balance
    /// visibility after the withdrawal is not immediately consistent.
    async fn withdraw(&self, wallet_ref: &str) -> Result<()>;
}

/// REST client for the yield vault service.
pub struct HttpYieldVault {
    http: Client,
    base_url: String,
}

impl HttpYieldVault {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, path: &str, query: &[(&str, String)]) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to call vault {}", path))?;

        let status = response.status();
        if !status.is_success() {
            bail!("vault {} rejected with HTTP {}", path, status);
        }
        debug!(%path, "Vault call accepted");
        Ok(())
    }
}

#[async_trait]
impl YieldVault for HttpYieldVault {
    #[instrument(skip(self, wallet_ref))]
    async fn deposit(&self, wallet_ref: &str, amount: Decimal) -> Result<()> {
        self.post(
            "/deposit",
            &[
                ("wallet", wallet_ref.to_string()),
                ("amount", amount.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self, wallet_ref))]
    async fn withdraw(&self, wallet_ref: &str) -> Result<()> {
        self.post("/withdraw", &[("wallet", wallet_ref.to_string())]).await
    }
}

/// No-op vault that records traffic, for paper trading and tests.
#[derive(Default)]
pub struct MockVault {
    deposits: AtomicU64,
    withdrawals: AtomicU64,
}

impl MockVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposits(&self) -> u64 {
        self.deposits.load(Ordering::SeqCst)
    }

    pub fn withdrawals(&self) -> u64 {
        self.withdrawals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl YieldVault for MockVault {
    async fn deposit(&self, _wallet_ref: &str, _amount: Decimal) -> Result<()> {
        self.deposits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn withdraw(&self, _wallet_ref: &str) -> Result<()> {
        self.withdrawals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
