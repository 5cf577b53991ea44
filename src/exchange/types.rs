//! Exchange-facing data types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a perpetual position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// The opposite direction, used when flipping a position.
    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open leveraged position as reported by the exchange.
///
/// At most one position per `(bot, token)` is expected to exist; the first
/// reported position for a token is treated as authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Token the position is in (e.g. "ETH")
    pub token: String,
    pub side: PositionSide,
    /// Notional size in quote-asset terms
    pub size_usd: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
}

/// Result of an accepted open/close order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub token: String,
    pub side: PositionSide,
    /// Quote-asset notional committed to the order
    pub usd_amount: Decimal,
}
