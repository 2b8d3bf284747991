//! Market data abstraction: where a session's candle sequence comes from.

use crate::domain::Candle;
use async_trait::async_trait;
use std::fmt;

pub mod klines;
pub mod mock;

pub use klines::KlineMarketData;
pub use mock::MockMarketData;

/// Supplier of ordered, finite candle sequences.
///
/// Implementations must return candles ordered by non-decreasing timestamp.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + fmt::Debug {
    /// Fetch a candle sequence for a new round.
    ///
    /// # Arguments
    /// * `seed` - Optional selector; the same seed yields the same sequence.
    ///   `None` lets the provider pick.
    async fn fetch_candles(&self, seed: Option<u64>) -> Result<Vec<Candle>, DataSourceError>;
}

/// Error type for market data operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// Provider returned nothing usable
    Empty,
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Empty => write!(f, "No candles returned"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}
