//! Cross-margin liquidation and PnL math.
//!
//! Every function here is pure. Inputs are validated and rejected with
//! [`EngineError::InvalidParameter`]; otherwise the functions are total.

use crate::domain::{Decimal, Side};

use super::EngineError;

/// Hard floor for leverage. The ceiling is a per-deployment rule.
pub const MIN_LEVERAGE: u32 = 1;

fn require_positive(name: &str, value: Decimal) -> Result<(), EngineError> {
    if value.is_positive() {
        Ok(())
    } else {
        Err(EngineError::InvalidParameter(format!(
            "{name} must be > 0, got {value}"
        )))
    }
}

fn require_leverage(leverage: u32) -> Result<(), EngineError> {
    if leverage < MIN_LEVERAGE {
        return Err(EngineError::InvalidParameter(format!(
            "leverage must be >= {MIN_LEVERAGE}, got {leverage}"
        )));
    }
    Ok(())
}

/// Signed fractional price move in the position's favour.
fn directional_change(
    entry_price: Decimal,
    current_price: Decimal,
    side: Side,
) -> Result<Decimal, EngineError> {
    require_positive("entry price", entry_price)?;
    let change = (current_price - entry_price) / entry_price;
    Ok(match side {
        Side::Long => change,
        Side::Short => -change,
    })
}

/// Price at which the whole account balance is lost.
///
/// The entire `account_balance` backs the position, so the fatal move is
/// `account_balance / notional_size`. A long whose notional does not exceed
/// the balance gets a liquidation price of `0`: it cannot be liquidated by
/// any positive price. That degenerate result is valid.
pub fn liquidation_price(
    entry_price: Decimal,
    leverage: u32,
    side: Side,
    account_balance: Decimal,
    notional_size: Decimal,
) -> Result<Decimal, EngineError> {
    require_positive("entry price", entry_price)?;
    require_leverage(leverage)?;
    require_positive("notional size", notional_size)?;
    if account_balance.is_negative() {
        return Err(EngineError::InvalidParameter(format!(
            "account balance must be >= 0, got {account_balance}"
        )));
    }

    let buffer = account_balance / notional_size;
    Ok(match side {
        Side::Long => (entry_price * (Decimal::ONE - buffer)).max(Decimal::ZERO),
        Side::Short => entry_price * (Decimal::ONE + buffer),
    })
}

/// Mark-to-market PnL. Leverage is already folded into `notional_size`.
pub fn unrealized_pnl(
    entry_price: Decimal,
    current_price: Decimal,
    side: Side,
    notional_size: Decimal,
) -> Result<Decimal, EngineError> {
    Ok(directional_change(entry_price, current_price, side)? * notional_size)
}

/// Percent return on margin: the directional move times leverage times 100.
pub fn roi(
    entry_price: Decimal,
    current_price: Decimal,
    side: Side,
    leverage: u32,
) -> Result<Decimal, EngineError> {
    require_leverage(leverage)?;
    Ok(directional_change(entry_price, current_price, side)?
        * Decimal::from(leverage)
        * Decimal::HUNDRED)
}

/// Long positions die at or below the liquidation price, shorts at or above.
///
/// Callers pass the candle's adverse extreme (low for long, high for short)
/// so an intra-period breach is not missed.
pub fn is_liquidated(current_price: Decimal, liquidation_price: Decimal, side: Side) -> bool {
    match side {
        Side::Long => current_price <= liquidation_price,
        Side::Short => current_price >= liquidation_price,
    }
}
