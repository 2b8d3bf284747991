//! Pure, deterministic game engine: margin math, position lifecycle,
//! candle clock and the session state machine. No I/O happens here.

use crate::domain::{Decimal, Side};
use thiserror::Error;

pub mod clock;
pub mod margin;
pub mod position_manager;
pub mod session;

pub use clock::{CandleClock, Tick};
pub use position_manager::{CloseOutcome, PositionManager};
pub use session::{GameRules, GameSession, NextDayOutcome, SessionStatus};

/// Local, recoverable rejections raised by the engine. A failed call never
/// leaves partial changes behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("A position is already open")]
    PositionAlreadyOpen,
    #[error("No position is open")]
    NoPosition,
    #[error("Cannot add {requested} to an open {open} position")]
    DirectionMismatch { open: Side, requested: Side },
    #[error("Position is not in profit (unrealized pnl {pnl})")]
    NotInProfit { pnl: Decimal },
    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Decimal, available: Decimal },
    #[error("No next-day uses remaining")]
    NoUsesRemaining,
    #[error("Session is over")]
    GameOver,
}
