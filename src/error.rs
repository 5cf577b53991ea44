//! Error taxonomy for one bot's execution cycle.
//!
//! Every failure is caught at the boundary of a single cycle so one bot can
//! never take down the scheduler or its neighbours. The variants matter:
//! signal problems must abort before any exchange call is made, while vault
//! problems are logged and never abort (see `strategy::rebalancer`).

use thiserror::Error;

/// Failure of a single reconciliation cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The signal API could not be reached or returned a bad response.
    /// No state is mutated and no exchange call is made.
    #[error("signal fetch failed: {0}")]
    SignalFetch(#[source] anyhow::Error),

    /// The batch contained no signal for the bot's token.
    #[error("no signal available for {token}")]
    MissingSignal { token: String },

    /// Both directional flags were set on the same signal. The cycle aborts
    /// without issuing any exchange call.
    #[error("ambiguous signal for {symbol}: long and short both set")]
    AmbiguousSignal { symbol: String },

    /// An exchange operation failed (insufficient balance, allowance,
    /// network). The exchange remains the source of truth; the position is
    /// re-read fresh on the next cycle.
    #[error("exchange {op} failed: {source}")]
    ExchangeCall {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl CycleError {
    /// Stable name used in audit events and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::SignalFetch(_) => "signal_fetch_error",
            CycleError::MissingSignal { .. } => "missing_signal",
            CycleError::AmbiguousSignal { .. } => "ambiguous_signal",
            CycleError::ExchangeCall { .. } => "exchange_call_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        let err = CycleError::AmbiguousSignal {
            symbol: "ETH".to_string(),
        };
        assert_eq!(err.kind(), "ambiguous_signal");
        assert!(err.to_string().contains("ETH"));
    }
}
