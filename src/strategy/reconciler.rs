//! Position reconciliation.
//!
//! Pure decision logic mapping the latest signal, the on-exchange position
//! and the freshness state to exactly one action per cycle. No I/O happens
//! here; the engine executes whatever comes out.

use crate::error::CycleError;
use crate::exchange::{Position, PositionSide};
use crate::registry::BotConfig;
use crate::signal::{FreshnessState, Signal};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// The single action a cycle may take against the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenPosition(PositionSide),
    ClosePosition,
    FlipPosition(PositionSide),
    KeepPosition,
    Idle,
}

/// An action together with the branch that produced it. The branch name is
/// what lands in the audit trail, so renaming one invalidates replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub branch: &'static str,
}

impl Decision {
    fn new(action: Action, branch: &'static str) -> Self {
        Self { action, branch }
    }
}

/// Decide what to do this cycle.
///
/// Evaluation order is fixed: ambiguity first, then risk exits (they
/// pre-empt signal direction), then signal-driven open/flip/keep, then the
/// staleness check. Deterministic given its inputs; calling twice with the
/// same inputs yields the same decision.
pub fn reconcile(
    signal: &Signal,
    position: Option<&Position>,
    state: &FreshnessState,
    config: &BotConfig,
    now: DateTime<Utc>,
) -> Result<Decision, CycleError> {
    if signal.is_ambiguous() {
        return Err(CycleError::AmbiguousSignal {
            symbol: signal.symbol.clone(),
        });
    }

    let position = match position {
        Some(position) => position,
        None => {
            // Flat: only a directional signal puts capital to work.
            return Ok(if signal.long {
                Decision::new(Action::OpenPosition(PositionSide::Long), "open_long")
            } else if signal.short {
                Decision::new(Action::OpenPosition(PositionSide::Short), "open_short")
            } else {
                Decision::new(Action::Idle, "no_position_idle")
            });
        }
    };

    // Risk exits come before any signal-based logic.
    if let Some(branch) = exit_branch(position, signal) {
        return Ok(Decision::new(Action::ClosePosition, branch));
    }

    let signal_side = if signal.long {
        Some(PositionSide::Long)
    } else if signal.short {
        Some(PositionSide::Short)
    } else {
        None
    };

    match signal_side {
        Some(side) if side == position.side => {
            Ok(Decision::new(Action::KeepPosition, "keep_same_side"))
        }
        Some(side) => Ok(Decision::new(Action::FlipPosition(side), "flip_position")),
        None => {
            let last_seen = match position.side {
                PositionSide::Long => state.last_long_signal_time,
                PositionSide::Short => state.last_short_signal_time,
            };
            let horizon = Duration::seconds(i64::from(config.keep_strategy_horizon_min) * 60);
            if now - last_seen > horizon {
                Ok(Decision::new(Action::ClosePosition, "stale_signal_close"))
            } else {
                Ok(Decision::new(Action::KeepPosition, "keep_within_horizon"))
            }
        }
    }
}

/// Stop-loss / take-profit check. Thresholds invert for shorts: a short is
/// stopped out when the mark rises and takes profit when it falls.
fn exit_branch(position: &Position, signal: &Signal) -> Option<&'static str> {
    let hundred = Decimal::ONE_HUNDRED;
    let entry = position.entry_price;
    let mark = position.mark_price;

    match position.side {
        PositionSide::Long => {
            let stop_price = entry * (Decimal::ONE - signal.stop_loss_pct / hundred);
            let take_price = entry * (Decimal::ONE + signal.take_profit_pct / hundred);
            if mark <= stop_price {
                Some("stop_loss_exit")
            } else if mark >= take_price {
                Some("take_profit_exit")
            } else {
                None
            }
        }
        PositionSide::Short => {
            let stop_price = entry * (Decimal::ONE + signal.stop_loss_pct / hundred);
            let take_price = entry * (Decimal::ONE - signal.take_profit_pct / hundred);
            if mark >= stop_price {
                Some("stop_loss_exit")
            } else if mark <= take_price {
                Some("take_profit_exit")
            } else {
                None
            }
        }
    }
}

impl Action {
    /// Stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Action::OpenPosition(_) => "open_position",
            Action::ClosePosition => "close_position",
            Action::FlipPosition(_) => "flip_position",
            Action::KeepPosition => "keep_position",
            Action::Idle => "idle",
        }
    }
}
