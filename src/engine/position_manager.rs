use crate::domain::{Decimal, Position, Side};
use serde::{Deserialize, Serialize};

use super::margin;
use super::EngineError;

/// Result of reducing or closing a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    pub percent: Decimal,
    pub closed_notional: Decimal,
    pub realized_pnl: Decimal,
    /// `None` after a full close.
    pub remaining: Option<Position>,
}

/// Owns the zero-or-one open position of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionManager {
    max_leverage: u32,
    position: Option<Position>,
}

fn require_percent(name: &str, value: Decimal) -> Result<(), EngineError> {
    if value.is_positive() && value <= Decimal::HUNDRED {
        Ok(())
    } else {
        Err(EngineError::InvalidParameter(format!(
            "{name} must be in (0, 100], got {value}"
        )))
    }
}

impl PositionManager {
    pub fn new(max_leverage: u32) -> Self {
        Self {
            max_leverage,
            position: None,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    /// Open a fresh position. `margin_pct` is the percent of `account_balance`
    /// committed as margin; the notional is that margin times `leverage`.
    pub fn open(
        &mut self,
        side: Side,
        leverage: u32,
        margin_pct: Decimal,
        price: Decimal,
        account_balance: Decimal,
    ) -> Result<Position, EngineError> {
        if self.position.is_some() {
            return Err(EngineError::PositionAlreadyOpen);
        }
        if leverage < margin::MIN_LEVERAGE || leverage > self.max_leverage {
            return Err(EngineError::InvalidParameter(format!(
                "leverage must be in [{}, {}], got {leverage}",
                margin::MIN_LEVERAGE,
                self.max_leverage
            )));
        }
        require_percent("margin percent", margin_pct)?;
        if !account_balance.is_positive() {
            return Err(EngineError::InvalidParameter(format!(
                "account balance must be > 0, got {account_balance}"
            )));
        }

        let notional_size = account_balance * margin_pct.percent_to_fraction() * Decimal::from(leverage);
        let liquidation_price =
            margin::liquidation_price(price, leverage, side, account_balance, notional_size)?;

        let position = Position {
            side,
            leverage,
            notional_size,
            entry_price: price,
            liquidation_price,
            current_price: price,
            unrealized_pnl: Decimal::ZERO,
            roi: Decimal::ZERO,
        };
        self.position = Some(position.clone());
        Ok(position)
    }

    /// Add to a winning position in the same direction.
    ///
    /// The add uses the position's existing leverage. The new entry is the
    /// notional-weighted average of the old entry and `price`. The added
    /// margin must fit in `account_balance + unrealized_pnl - used_margin`.
    pub fn scale_in(
        &mut self,
        side: Side,
        additional_margin_pct: Decimal,
        price: Decimal,
        account_balance: Decimal,
    ) -> Result<Position, EngineError> {
        let current = self.position.as_ref().ok_or(EngineError::NoPosition)?;
        if current.side != side {
            return Err(EngineError::DirectionMismatch {
                open: current.side,
                requested: side,
            });
        }
        require_percent("margin percent", additional_margin_pct)?;

        let pnl = margin::unrealized_pnl(current.entry_price, price, side, current.notional_size)?;
        if !pnl.is_positive() {
            return Err(EngineError::NotInProfit { pnl });
        }

        let added_margin = account_balance * additional_margin_pct.percent_to_fraction();
        let available = account_balance + pnl - current.margin();
        if added_margin > available {
            return Err(EngineError::InsufficientMargin {
                required: added_margin,
                available,
            });
        }

        let added_notional = added_margin * Decimal::from(current.leverage);
        let combined_notional = current.notional_size + added_notional;
        let entry_price = (current.entry_price * current.notional_size + price * added_notional)
            / combined_notional;
        let liquidation_price = margin::liquidation_price(
            entry_price,
            current.leverage,
            side,
            account_balance,
            combined_notional,
        )?;

        let mut updated = current.clone();
        updated.notional_size = combined_notional;
        updated.entry_price = entry_price;
        updated.liquidation_price = liquidation_price;
        Self::mark_position(&mut updated, price)?;

        self.position = Some(updated.clone());
        Ok(updated)
    }

    /// Close `percent` of the position at `price`.
    ///
    /// A partial close shrinks the notional and recomputes the liquidation
    /// price against `account_balance + realized_pnl`; the entry price never
    /// changes.
    pub fn close(
        &mut self,
        percent: Decimal,
        price: Decimal,
        account_balance: Decimal,
    ) -> Result<CloseOutcome, EngineError> {
        let current = self.position.as_ref().ok_or(EngineError::NoPosition)?;
        require_percent("close percent", percent)?;

        let closed_notional = if percent == Decimal::HUNDRED {
            current.notional_size
        } else {
            current.notional_size * percent.percent_to_fraction()
        };
        let realized_pnl =
            margin::unrealized_pnl(current.entry_price, price, current.side, closed_notional)?;

        let remaining = if percent == Decimal::HUNDRED {
            None
        } else {
            let mut rest = current.clone();
            rest.notional_size = current.notional_size - closed_notional;
            let backing = (account_balance + realized_pnl).max(Decimal::ZERO);
            rest.liquidation_price = margin::liquidation_price(
                rest.entry_price,
                rest.leverage,
                rest.side,
                backing,
                rest.notional_size,
            )?;
            Self::mark_position(&mut rest, price)?;
            Some(rest)
        };

        self.position = remaining.clone();
        Ok(CloseOutcome {
            percent,
            closed_notional,
            realized_pnl,
            remaining,
        })
    }

    /// Refresh the mark fields of the open position, if any.
    pub fn mark(&mut self, price: Decimal) -> Result<(), EngineError> {
        if let Some(position) = self.position.as_mut() {
            Self::mark_position(position, price)?;
        }
        Ok(())
    }

    /// Drop the position without realizing anything. Used on liquidation.
    pub fn take(&mut self) -> Option<Position> {
        self.position.take()
    }

    fn mark_position(position: &mut Position, price: Decimal) -> Result<(), EngineError> {
        position.current_price = price;
        position.unrealized_pnl = margin::unrealized_pnl(
            position.entry_price,
            price,
            position.side,
            position.notional_size,
        )?;
        position.roi = margin::roi(position.entry_price, price, position.side, position.leverage)?;
        Ok(())
    }
}
