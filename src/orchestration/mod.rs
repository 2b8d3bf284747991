//! Services that sit between the HTTP surface and the engine/ledger store.

pub mod game;
pub mod ledger;
pub mod referrals;

pub use game::{GameService, GameServiceError, Restarted};
pub use ledger::{DailyClaim, LedgerError, TokenLedger};
pub use referrals::{ReferralDispatcher, ReferralError};
