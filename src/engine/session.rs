//! Game session state machine.
//!
//! A [`GameSession`] composes the candle clock and the position manager.
//! Its fields are private; the only ways to change it are the transitions
//! below, and each one either fully applies or leaves the session untouched.

use crate::domain::{Candle, Decimal, OwnerId, Position, Side, TimeMs};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::clock::{CandleClock, Tick};
use super::margin;
use super::position_manager::{CloseOutcome, PositionManager};
use super::EngineError;

/// Fixed parameters of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRules {
    pub starting_balance: Decimal,
    pub next_day_uses: u32,
    pub guest_next_day_uses: u32,
    pub max_leverage: u32,
    /// Candles of history visible when a round begins.
    pub initial_reveal: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::from(1000_i64),
            next_day_uses: 15,
            guest_next_day_uses: 7,
            max_leverage: 100,
            initial_reveal: 60,
        }
    }
}

impl GameRules {
    pub fn uses_for(&self, owner: &OwnerId) -> u32 {
        if owner.is_guest() {
            self.guest_next_day_uses
        } else {
            self.next_day_uses
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Setup,
    Active,
    Liquidated,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Setup => "setup",
            SessionStatus::Active => "active",
            SessionStatus::Liquidated => "liquidated",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Liquidated | SessionStatus::Ended)
    }
}

/// What a `next_day` step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NextDayOutcome {
    /// A candle was revealed and the session carries on.
    #[serde(rename_all = "camelCase")]
    Advanced { candle: Candle },
    /// The adverse extreme crossed the liquidation price.
    #[serde(rename_all = "camelCase")]
    Liquidated { candle: Candle, realized_pnl: Decimal },
    /// The last use was spent; any open position was closed at the candle close.
    #[serde(rename_all = "camelCase")]
    Ended {
        candle: Candle,
        forced_close: Option<CloseOutcome>,
    },
    /// No candles left; any open position was closed at the last visible close.
    #[serde(rename_all = "camelCase")]
    EndOfData { forced_close: Option<CloseOutcome> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    session_id: Uuid,
    owner_id: OwnerId,
    starting_balance: Decimal,
    balance: Decimal,
    next_day_uses_remaining: u32,
    clock: CandleClock,
    positions: PositionManager,
    liquidated: bool,
    ended: bool,
    realized_pnl_total: Decimal,
    started_at: TimeMs,
}

impl GameSession {
    /// Begin a round at the starting balance.
    pub fn start(owner_id: OwnerId, candles: Vec<Candle>, rules: &GameRules) -> Result<Self, EngineError> {
        Self::with_balance(owner_id, candles, rules, rules.starting_balance)
    }

    /// Begin the next round. Profit above the starting balance carries over;
    /// anything at or below it resets to the starting balance.
    pub fn restart(&self, candles: Vec<Candle>, rules: &GameRules) -> Result<Self, EngineError> {
        let balance = if self.balance > rules.starting_balance {
            self.balance
        } else {
            rules.starting_balance
        };
        Self::with_balance(self.owner_id.clone(), candles, rules, balance)
    }

    fn with_balance(
        owner_id: OwnerId,
        candles: Vec<Candle>,
        rules: &GameRules,
        balance: Decimal,
    ) -> Result<Self, EngineError> {
        let clock = CandleClock::new(candles, rules.initial_reveal)?;
        let next_day_uses_remaining = rules.uses_for(&owner_id);
        Ok(Self {
            session_id: Uuid::new_v4(),
            owner_id,
            starting_balance: rules.starting_balance,
            balance,
            next_day_uses_remaining,
            clock,
            positions: PositionManager::new(rules.max_leverage),
            liquidated: false,
            ended: next_day_uses_remaining == 0,
            realized_pnl_total: Decimal::ZERO,
            started_at: TimeMs::now(),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn starting_balance(&self) -> Decimal {
        self.starting_balance
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn next_day_uses_remaining(&self) -> u32 {
        self.next_day_uses_remaining
    }

    pub fn reveal_index(&self) -> usize {
        self.clock.reveal_index()
    }

    pub fn candle_count(&self) -> usize {
        self.clock.len()
    }

    pub fn visible_candles(&self) -> impl Iterator<Item = &Candle> + '_ {
        self.clock.visible_candles()
    }

    pub fn current_price(&self) -> Decimal {
        self.clock.current().close
    }

    pub fn position(&self) -> Option<&Position> {
        self.positions.position()
    }

    pub fn is_liquidated(&self) -> bool {
        self.liquidated
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn realized_pnl_total(&self) -> Decimal {
        self.realized_pnl_total
    }

    pub fn started_at(&self) -> TimeMs {
        self.started_at
    }

    pub fn status(&self) -> SessionStatus {
        if self.liquidated {
            SessionStatus::Liquidated
        } else if self.ended {
            SessionStatus::Ended
        } else if self.positions.is_open() {
            SessionStatus::Active
        } else {
            SessionStatus::Setup
        }
    }

    /// Run `f` against a scratch copy and keep the result only on success.
    fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut draft = self.clone();
        let out = f(&mut draft)?;
        *self = draft;
        Ok(out)
    }

    fn ensure_playable(&self) -> Result<(), EngineError> {
        if self.status().is_terminal() {
            return Err(EngineError::GameOver);
        }
        Ok(())
    }

    /// Open a position at the current close.
    pub fn open_position(
        &mut self,
        side: Side,
        leverage: u32,
        margin_pct: Decimal,
    ) -> Result<Position, EngineError> {
        self.ensure_playable()?;
        let price = self.current_price();
        let balance = self.balance;
        let position = self.positions.open(side, leverage, margin_pct, price, balance)?;
        info!(
            owner = %self.owner_id,
            session_id = %self.session_id,
            side = %side,
            leverage,
            notional = %position.notional_size,
            entry = %position.entry_price,
            liquidation = %position.liquidation_price,
            "Position opened"
        );
        Ok(position)
    }

    /// Add to a winning position at the current close.
    pub fn scale_in(&mut self, side: Side, margin_pct: Decimal) -> Result<Position, EngineError> {
        self.ensure_playable()?;
        let price = self.current_price();
        let balance = self.balance;
        let position = self.positions.scale_in(side, margin_pct, price, balance)?;
        info!(
            owner = %self.owner_id,
            session_id = %self.session_id,
            notional = %position.notional_size,
            entry = %position.entry_price,
            liquidation = %position.liquidation_price,
            "Position scaled in"
        );
        Ok(position)
    }

    /// Close `percent` of the position at the current close and book the PnL.
    pub fn close_position(&mut self, percent: Decimal) -> Result<CloseOutcome, EngineError> {
        self.ensure_playable()?;
        self.transact(|s| {
            let price = s.current_price();
            let outcome = s.realize_close(percent, price)?;
            info!(
                owner = %s.owner_id,
                session_id = %s.session_id,
                percent = %percent,
                realized_pnl = %outcome.realized_pnl,
                balance = %s.balance,
                "Position closed"
            );
            Ok(outcome)
        })
    }

    fn realize_close(&mut self, percent: Decimal, price: Decimal) -> Result<CloseOutcome, EngineError> {
        let outcome = self.positions.close(percent, price, self.balance)?;
        self.balance += outcome.realized_pnl;
        self.realized_pnl_total += outcome.realized_pnl;
        Ok(outcome)
    }

    /// Reveal one more candle and settle the consequences.
    pub fn next_day(&mut self) -> Result<NextDayOutcome, EngineError> {
        if self.next_day_uses_remaining == 0 {
            return Err(EngineError::NoUsesRemaining);
        }
        self.ensure_playable()?;
        self.transact(Self::step)
    }

    fn step(&mut self) -> Result<NextDayOutcome, EngineError> {
        let candle = match self.clock.advance() {
            Tick::Revealed(candle) => candle,
            Tick::EndOfData => {
                let forced_close = self.force_close(self.current_price())?;
                self.ended = true;
                info!(owner = %self.owner_id, session_id = %self.session_id, "Candle data exhausted, session ended");
                return Ok(NextDayOutcome::EndOfData { forced_close });
            }
        };
        self.next_day_uses_remaining -= 1;

        if let Some(position) = self.positions.position() {
            let probe = candle.adverse_extreme(position.side);
            if margin::is_liquidated(probe, position.liquidation_price, position.side) {
                let lost_margin = position.margin();
                self.positions.take();
                self.balance = self.starting_balance;
                self.realized_pnl_total += -lost_margin;
                self.liquidated = true;
                self.ended = true;
                info!(
                    owner = %self.owner_id,
                    session_id = %self.session_id,
                    probe = %probe,
                    lost_margin = %lost_margin,
                    "Position liquidated"
                );
                return Ok(NextDayOutcome::Liquidated {
                    candle,
                    realized_pnl: -lost_margin,
                });
            }
            self.positions.mark(candle.close)?;
        }

        if self.next_day_uses_remaining == 0 {
            let forced_close = self.force_close(candle.close)?;
            self.ended = true;
            info!(
                owner = %self.owner_id,
                session_id = %self.session_id,
                forced = forced_close.is_some(),
                balance = %self.balance,
                "Next-day uses exhausted, session ended"
            );
            return Ok(NextDayOutcome::Ended {
                candle,
                forced_close,
            });
        }

        Ok(NextDayOutcome::Advanced { candle })
    }

    fn force_close(&mut self, price: Decimal) -> Result<Option<CloseOutcome>, EngineError> {
        if !self.positions.is_open() {
            return Ok(None);
        }
        self.realize_close(Decimal::HUNDRED, price).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn flat(n: i64, px: &str) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(TimeMs::new(i), d(px), d(px), d(px), d(px)))
            .collect()
    }

    fn rules(uses: u32) -> GameRules {
        GameRules {
            next_day_uses: uses,
            initial_reveal: 0,
            ..GameRules::default()
        }
    }

    fn owner() -> OwnerId {
        OwnerId::from_str("alice").unwrap()
    }

    #[test]
    fn test_start_is_setup_at_starting_balance() {
        let s = GameSession::start(owner(), flat(5, "100"), &rules(3)).unwrap();
        assert_eq!(s.status(), SessionStatus::Setup);
        assert_eq!(s.balance(), d("1000"));
        assert_eq!(s.next_day_uses_remaining(), 3);
        assert_eq!(s.reveal_index(), 0);
    }

    #[test]
    fn test_guest_gets_guest_allowance() {
        let guest = OwnerId::from_str("guest:xyz").unwrap();
        let s = GameSession::start(guest, flat(5, "100"), &GameRules::default()).unwrap();
        assert_eq!(s.next_day_uses_remaining(), 7);
    }

    #[test]
    fn test_setup_active_setup_cycle() {
        let mut s = GameSession::start(owner(), flat(5, "100"), &rules(3)).unwrap();
        s.open_position(Side::Long, 5, d("10")).unwrap();
        assert_eq!(s.status(), SessionStatus::Active);
        s.close_position(Decimal::HUNDRED).unwrap();
        assert_eq!(s.status(), SessionStatus::Setup);
        assert_eq!(s.balance(), d("1000"));
    }

    #[test]
    fn test_failed_close_leaves_session_unchanged() {
        let mut s = GameSession::start(owner(), flat(5, "100"), &rules(3)).unwrap();
        let before = s.clone();
        assert_eq!(s.close_position(d("50")), Err(EngineError::NoPosition));
        assert_eq!(s, before);
    }

    #[test]
    fn test_end_of_data_does_not_consume_use() {
        let mut s = GameSession::start(owner(), flat(2, "100"), &rules(5)).unwrap();
        assert!(matches!(s.next_day().unwrap(), NextDayOutcome::Advanced { .. }));
        assert_eq!(s.next_day_uses_remaining(), 4);

        let out = s.next_day().unwrap();
        assert_eq!(out, NextDayOutcome::EndOfData { forced_close: None });
        assert_eq!(s.next_day_uses_remaining(), 4);
        assert_eq!(s.status(), SessionStatus::Ended);
        assert_eq!(s.next_day(), Err(EngineError::GameOver));
    }

    #[test]
    fn test_terminal_session_rejects_trading() {
        let mut s = GameSession::start(owner(), flat(5, "100"), &rules(1)).unwrap();
        s.next_day().unwrap();
        assert_eq!(s.status(), SessionStatus::Ended);
        assert_eq!(s.next_day(), Err(EngineError::NoUsesRemaining));
        assert_eq!(
            s.open_position(Side::Long, 2, d("10")),
            Err(EngineError::GameOver)
        );
    }
}
