//! Signal wire types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A timestamped directional prediction for a token.
///
/// `long` and `short` are independent flags; a signal with both set is
/// ambiguous and must never reach the exchange. `stop_loss_pct` and
/// `take_profit_pct` are expressed in percent (5 = 5%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub long: bool,
    pub short: bool,
    /// Prediction horizon in minutes
    pub horizon_min: u32,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub prediction_time: DateTime<Utc>,
}

impl Signal {
    /// True when neither directional flag is set.
    pub fn is_neutral(&self) -> bool {
        !self.long && !self.short
    }

    /// True when both directional flags are set.
    pub fn is_ambiguous(&self) -> bool {
        self.long && self.short
    }
}

/// Sort a batch ascending by prediction time. The API contract says batches
/// arrive sorted, but a misordered batch would silently corrupt staleness
/// accounting, so the provider sorts defensively.
pub fn sort_batch(batch: &mut [Signal]) {
    batch.sort_by_key(|s| s.prediction_time);
}
