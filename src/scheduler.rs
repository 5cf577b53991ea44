//! Cycle scheduler.
//!
//! Drives one reconciliation cycle per bot per tick. Bots run concurrently
//! under a semaphore cap; a bot whose previous cycle is still in flight is
//! skipped for the tick (single-flight), so two cycles can never race on the
//! same exchange position. On shutdown the loop stops scheduling and lets
//! in-flight cycles finish naturally.

use crate::error::CycleError;
use crate::registry::{BotConfig, BotRegistry};
use crate::strategy::StrategyEngine;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Builds a fresh engine for a bot loaded from the registry.
pub type EngineFactory = Arc<dyn Fn(&BotConfig) -> StrategyEngine + Send + Sync>;

/// Scheduling knobs, taken from the application config.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub poll_interval: Duration,
    /// Cap on simultaneously running cycles across all bots
    pub max_concurrent_cycles: usize,
    /// Hard bound on one cycle, over and above the per-request timeouts
    pub cycle_timeout: Duration,
}

pub struct Scheduler {
    registry: Arc<BotRegistry>,
    factory: EngineFactory,
    options: SchedulerOptions,
    permits: Arc<Semaphore>,
    engines: HashMap<i64, Arc<Mutex<StrategyEngine>>>,
}

impl Scheduler {
    pub fn new(registry: Arc<BotRegistry>, factory: EngineFactory, options: SchedulerOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrent_cycles));
        Self {
            registry,
            factory,
            options,
            permits,
            engines: HashMap::new(),
        }
    }

    /// Run until `shutdown` flips, then drain in-flight cycles.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let mut in_flight = JoinSet::new();
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            poll_secs = self.options.poll_interval.as_secs(),
            max_concurrent = self.options.max_concurrent_cycles,
            "Scheduler started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            ticker.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            // Reap finished cycles so the set does not grow unbounded.
            while in_flight.try_join_next().is_some() {}
            if let Err(e) = self.run_round(&mut in_flight).await {
                error!(error = %e, "Scheduling round failed");
            }
        }

        info!(
            remaining = in_flight.len(),
            "Shutdown requested; waiting for in-flight cycles"
        );
        while in_flight.join_next().await.is_some() {}
        Ok(())
    }

    /// Schedule one cycle for every active bot that is not already running.
    async fn run_round(&mut self, in_flight: &mut JoinSet<()>) -> Result<()> {
        let bots = self.registry.read_bots()?;

        // Engines for bots that left the registry are discarded; their
        // freshness state dies with them.
        let active: std::collections::HashSet<i64> = bots.iter().map(|b| b.bot_id).collect();
        self.engines.retain(|bot_id, _| active.contains(bot_id));

        for bot in bots {
            let bot_id = bot.bot_id;
            let engine = self
                .engines
                .entry(bot_id)
                .or_insert_with(|| Arc::new(Mutex::new((self.factory)(&bot))))
                .clone();

            // Single-flight: a held lock means the previous cycle for this
            // bot has not finished yet.
            let Ok(mut guard) = engine.try_lock_owned() else {
                warn!(bot_id, "Previous cycle still running; skipping tick");
                continue;
            };

            let permits = self.permits.clone();
            let cycle_timeout = self.options.cycle_timeout;
            in_flight.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                match tokio::time::timeout(cycle_timeout, guard.run_cycle()).await {
                    Ok(Ok(action)) => {
                        info!(bot_id, action = action.name(), "Cycle completed");
                    }
                    Ok(Err(e)) => match &e {
                        CycleError::AmbiguousSignal { .. } | CycleError::MissingSignal { .. } => {
                            warn!(bot_id, error = %e, "Cycle aborted");
                        }
                        _ => {
                            error!(bot_id, error = %e, "Cycle failed");
                        }
                    },
                    Err(_) => {
                        error!(
                            bot_id,
                            timeout_secs = cycle_timeout.as_secs(),
                            "Cycle timed out"
                        );
                    }
                }
            });
        }

        Ok(())
    }
}
