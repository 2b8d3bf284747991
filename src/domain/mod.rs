//! Domain types for the leveraged trading simulator.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: TimeMs, OwnerId, Side
//! - Candle, Position, token account and referral records

pub mod candle;
pub mod decimal;
pub mod position;
pub mod primitives;
pub mod referral;
pub mod token;

pub use candle::Candle;
pub use decimal::Decimal;
pub use position::Position;
pub use primitives::{OwnerId, OwnerIdParseError, Side, TimeMs};
pub use referral::{derive_referral_code, normalize_code, Referral};
pub use token::{TokenAccount, TokenEvent, TokenReason};
