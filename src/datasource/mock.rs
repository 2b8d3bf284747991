//! Mock market data source for testing without network calls.

use super::{DataSourceError, MarketDataProvider};
use crate::domain::{Candle, Decimal, TimeMs};
use async_trait::async_trait;

/// Returns predefined candle series. With several series loaded, the seed
/// picks one (`seed % len`); no seed picks the first.
#[derive(Debug, Clone, Default)]
pub struct MockMarketData {
    series: Vec<Vec<Candle>>,
    failure: Option<DataSourceError>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, candles: Vec<Candle>) -> Self {
        self.series.push(candles);
        self
    }

    /// A provider whose every call fails with `error`.
    pub fn failing(error: DataSourceError) -> Self {
        Self {
            series: Vec::new(),
            failure: Some(error),
        }
    }

    /// `n` daily candles with open = close = high = low = `price`.
    pub fn flat_series(n: usize, price: Decimal) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(TimeMs::new(i as i64 * 86_400_000), price, price, price, price))
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    async fn fetch_candles(&self, seed: Option<u64>) -> Result<Vec<Candle>, DataSourceError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.series.is_empty() {
            return Err(DataSourceError::Empty);
        }
        let index = seed.map(|s| (s % self.series.len() as u64) as usize).unwrap_or(0);
        Ok(self.series[index].clone())
    }
}
