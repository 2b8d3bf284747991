//! The single leveraged position a game session may hold.

use crate::domain::{Decimal, Side};
use serde::{Deserialize, Serialize};

/// An open leveraged position.
///
/// `notional_size` already includes leverage, so the margin committed is
/// always `notional_size / leverage`. The mark fields (`current_price`,
/// `unrealized_pnl`, `roi`) are refreshed whenever the clock moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub side: Side,
    pub leverage: u32,
    pub notional_size: Decimal,
    pub entry_price: Decimal,
    pub liquidation_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    /// Percent return on margin.
    pub roi: Decimal,
}

impl Position {
    pub fn margin(&self) -> Decimal {
        self.notional_size / Decimal::from(self.leverage)
    }
}
