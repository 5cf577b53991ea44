//! Perp Pilot - Main Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand};
use perp_pilot::config::Config;
use perp_pilot::db::open_pool;
use perp_pilot::events::SqliteEventLog;
use perp_pilot::exchange::{ExchangeAdapter, GatewayExchange, MockExchange};
use perp_pilot::registry::{BotConfig, BotRegistry};
use perp_pilot::scheduler::{EngineFactory, Scheduler, SchedulerOptions};
use perp_pilot::signal::HttpSignalProvider;
use perp_pilot::strategy::StrategyEngine;
use perp_pilot::vault::{HttpYieldVault, MockVault, YieldVault};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Perp Pilot CLI
#[derive(Parser)]
#[command(name = "perp-pilot")]
#[command(version, about = "Signal-driven perpetual position bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduling loop (default)
    Run {
        /// Paper trading: in-memory exchange and vault, real signals
        #[arg(long)]
        paper: bool,
    },

    /// List active bots from the registry
    Bots,

    /// Show recent audit events
    Events {
        /// Restrict to one bot
        #[arg(short, long)]
        bot_id: Option<i64>,

        /// Maximum number of events to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Register a new bot
    AddBot {
        /// Opaque wallet reference (never key material)
        #[arg(long)]
        wallet_ref: String,

        /// Token to trade (e.g. ETH)
        #[arg(long)]
        token: String,

        #[arg(long, default_value = "3")]
        leverage: u32,

        /// Minutes to keep a position without a confirming signal
        #[arg(long)]
        keep_horizon_min: Option<u32>,

        #[arg(long, default_value = "USDC")]
        base_asset: String,

        /// Park wallet balances above this in the yield vault
        #[arg(long)]
        min_wallet_for_yield: Option<Decimal>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let config = Config::load()?;

    match cli.command.unwrap_or(Commands::Run { paper: false }) {
        Commands::Run { paper } => run(config, paper).await,
        Commands::Bots => list_bots(&config),
        Commands::Events { bot_id, limit } => show_events(&config, bot_id, limit),
        Commands::AddBot {
            wallet_ref,
            token,
            leverage,
            keep_horizon_min,
            base_asset,
            min_wallet_for_yield,
        } => add_bot(
            &config,
            &wallet_ref,
            &token,
            leverage,
            keep_horizon_min,
            &base_asset,
            min_wallet_for_yield,
        ),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: Config, paper: bool) -> Result<()> {
    config.validate()?;

    if paper {
        warn!("PAPER TRADING MODE - orders stay in memory");
    }

    let pool = open_pool(&config.database.path, config.database.pool_size)?;
    let registry = Arc::new(BotRegistry::new(pool.clone())?);
    let events = Arc::new(SqliteEventLog::new(pool)?);

    let signals = Arc::new(HttpSignalProvider::new(
        &config.signals.base_url,
        &config.signals.api_password,
        config.signals.timeout_secs,
    )?);

    let vault: Arc<dyn YieldVault> = if paper {
        Arc::new(MockVault::new())
    } else {
        Arc::new(HttpYieldVault::new(
            &config.vault.base_url,
            config.vault.timeout_secs,
        )?)
    };

    let settle_delay = Duration::from_secs(config.vault.settle_delay_secs);
    let gateway_config = config.gateway.clone();
    let factory: EngineFactory = Arc::new(move |bot: &BotConfig| {
        let exchange: Arc<dyn ExchangeAdapter> = if paper {
            Arc::new(MockExchange::new(dec!(10000)))
        } else {
            Arc::new(
                GatewayExchange::new(
                    &gateway_config.base_url,
                    &gateway_config.api_key,
                    &bot.wallet_ref,
                    gateway_config.timeout_secs,
                )
                .expect("Failed to create gateway client"),
            )
        };
        StrategyEngine::new(
            bot.clone(),
            signals.clone(),
            exchange,
            vault.clone(),
            events.clone(),
            settle_delay,
        )
    });

    let options = SchedulerOptions {
        poll_interval: Duration::from_secs(config.engine.poll_interval_secs),
        max_concurrent_cycles: config.engine.max_concurrent_cycles,
        cycle_timeout: Duration::from_secs(config.engine.cycle_timeout_secs),
    };
    let mut scheduler = Scheduler::new(registry, factory, options);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    info!(version = env!("CARGO_PKG_VERSION"), "Starting scheduler");
    scheduler.run(shutdown).await
}

fn list_bots(config: &Config) -> Result<()> {
    let pool = open_pool(&config.database.path, config.database.pool_size)?;
    let registry = BotRegistry::new(pool)?;

    let bots = registry.read_bots()?;
    if bots.is_empty() {
        println!("No active bots.");
        return Ok(());
    }

    for bot in bots {
        println!(
            "#{} {} {}x on {} (keep {} min, yield above {} {})",
            bot.bot_id,
            bot.token,
            bot.leverage,
            bot.wallet_ref,
            bot.keep_strategy_horizon_min,
            bot.min_wallet_for_yield,
            bot.base_asset,
        );
    }
    Ok(())
}

fn show_events(config: &Config, bot_id: Option<i64>, limit: usize) -> Result<()> {
    let pool = open_pool(&config.database.path, config.database.pool_size)?;
    let events = SqliteEventLog::new(pool)?;

    for event in events.recent_events(bot_id, limit)? {
        println!(
            "{} bot={} {} {}",
            event.created_at.to_rfc3339(),
            event.bot_id,
            event.event_name,
            event.event_data,
        );
    }
    Ok(())
}

fn add_bot(
    config: &Config,
    wallet_ref: &str,
    token: &str,
    leverage: u32,
    keep_horizon_min: Option<u32>,
    base_asset: &str,
    min_wallet_for_yield: Option<Decimal>,
) -> Result<()> {
    anyhow::ensure!(
        (1..=100).contains(&leverage),
        "leverage must be between 1 and 100"
    );

    let pool = open_pool(&config.database.path, config.database.pool_size)?;
    let registry = BotRegistry::new(pool)?;

    let bot_id = registry.insert_bot(
        wallet_ref,
        token,
        leverage,
        keep_horizon_min,
        base_asset,
        min_wallet_for_yield.unwrap_or(config.engine.min_wallet_for_yield),
    )?;

    println!("Registered bot #{} trading {} at {}x", bot_id, token, leverage);
    Ok(())
}
