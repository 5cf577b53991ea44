//! Configuration management.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Signal API access
    #[serde(default)]
    pub signals: SignalsConfig,
    /// Order execution gateway access
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Yield vault service access
    #[serde(default)]
    pub vault: VaultConfig,
    /// Local database (bot registry + audit events)
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Scheduling parameters
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Base URL of the signal API
    #[serde(default)]
    pub base_url: String,
    /// Access password passed as a query parameter
    #[serde(default)]
    pub api_password: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the execution gateway
    #[serde(default)]
    pub base_url: String,
    /// Bearer token for gateway requests
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Base URL of the yield vault service
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Wait after a vault withdrawal before re-reading the wallet balance;
    /// balance visibility after an on-chain transfer lags
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Fixed connection pool size shared by the registry and the event log
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between scheduling rounds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Cap on simultaneously running cycles
    #[serde(default = "default_max_concurrent_cycles")]
    pub max_concurrent_cycles: usize,
    /// Hard bound on a single cycle
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,
    /// Yield threshold applied to bots that do not set their own
    #[serde(default = "default_min_wallet_for_yield")]
    pub min_wallet_for_yield: Decimal,
}

// Default value functions
fn default_request_timeout() -> u64 {
    30
}

fn default_settle_delay() -> u64 {
    15
}

fn default_db_path() -> String {
    "data/perp_pilot.db".to_string()
}

fn default_pool_size() -> u32 {
    4
}

fn default_poll_interval() -> u64 {
    60
}

fn default_max_concurrent_cycles() -> usize {
    4
}

fn default_cycle_timeout() -> u64 {
    120
}

fn default_min_wallet_for_yield() -> Decimal {
    Decimal::new(50, 0) // 50 USDC
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("PP"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.signals.base_url.is_empty(),
            "signals.base_url must be set"
        );
        anyhow::ensure!(
            !self.gateway.base_url.is_empty(),
            "gateway.base_url must be set"
        );
        anyhow::ensure!(
            self.engine.max_concurrent_cycles >= 1,
            "engine.max_concurrent_cycles must be at least 1"
        );
        anyhow::ensure!(
            self.engine.cycle_timeout_secs > self.signals.timeout_secs,
            "engine.cycle_timeout_secs must exceed the per-request timeout"
        );
        anyhow::ensure!(self.database.pool_size >= 1, "database.pool_size must be at least 1");

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signals: SignalsConfig::default(),
            gateway: GatewayConfig::default(),
            vault: VaultConfig::default(),
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_password: String::new(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: default_request_timeout(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_concurrent_cycles: default_max_concurrent_cycles(),
            cycle_timeout_secs: default_cycle_timeout(),
            min_wallet_for_yield: default_min_wallet_for_yield(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_needs_urls() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_with_urls_is_valid() {
        let mut config = Config::default();
        config.signals.base_url = "https://signals.example.com".to_string();
        config.gateway.base_url = "https://gateway.example.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cycle_timeout_must_exceed_request_timeout() {
        let mut config = Config::default();
        config.signals.base_url = "https://signals.example.com".to_string();
        config.gateway.base_url = "https://gateway.example.com".to_string();
        config.engine.cycle_timeout_secs = 10;
        assert!(config.validate().is_err());
    }
}
