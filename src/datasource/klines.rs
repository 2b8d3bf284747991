//! HTTP kline client for Binance-compatible `GET /api/v3/klines` endpoints.

use super::{DataSourceError, MarketDataProvider};
use crate::domain::{Candle, Decimal, TimeMs};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Historical candle source. A seed picks the symbol and the window start
/// deterministically, so a seeded round can be replayed.
#[derive(Debug, Clone)]
pub struct KlineMarketData {
    client: Client,
    base_url: String,
    symbols: Vec<String>,
    interval: String,
    interval_ms: i64,
    limit: u32,
    history_start_ms: i64,
}

/// A resolved request window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineWindow {
    pub symbol: String,
    pub start_ms: i64,
}

/// Parse an interval like `15m`, `4h`, `1d` or `1w` into milliseconds.
pub fn parse_interval_ms(interval: &str) -> Option<i64> {
    let interval = interval.trim();
    if interval.len() < 2 {
        return None;
    }
    let (count, unit) = interval.split_at(interval.len() - 1);
    let count: i64 = count.parse().ok().filter(|c| *c > 0)?;
    let unit_ms = match unit {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 7 * 86_400_000,
        _ => return None,
    };
    Some(count * unit_ms)
}

impl KlineMarketData {
    /// # Errors
    /// Returns `DataSourceError::Other` for an empty symbol list or an
    /// unrecognised interval.
    pub fn new(
        base_url: String,
        symbols: Vec<String>,
        interval: String,
        limit: u32,
        history_start_ms: i64,
    ) -> Result<Self, DataSourceError> {
        if symbols.is_empty() {
            return Err(DataSourceError::Other("no symbols configured".to_string()));
        }
        let interval_ms = parse_interval_ms(&interval)
            .ok_or_else(|| DataSourceError::Other(format!("invalid interval {}", interval)))?;
        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            symbols,
            interval,
            interval_ms,
            limit,
            history_start_ms,
        })
    }

    /// Map a seed onto a symbol and a start time inside
    /// `[history_start, now - limit * interval]`.
    pub fn window_for_seed(&self, seed: u64, now_ms: i64) -> KlineWindow {
        let digest = Sha256::digest(seed.to_le_bytes());
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        a.copy_from_slice(&digest[..8]);
        b.copy_from_slice(&digest[8..16]);

        let symbol = self.symbols[(u64::from_le_bytes(a) % self.symbols.len() as u64) as usize].clone();

        let latest_start = now_ms - self.interval_ms * i64::from(self.limit);
        let span = (latest_start - self.history_start_ms).max(0);
        let offset = if span == 0 {
            0
        } else {
            (u64::from_le_bytes(b) % span as u64) as i64
        };
        // snap to interval boundary
        let start_ms = self.history_start_ms + offset - offset % self.interval_ms;

        KlineWindow { symbol, start_ms }
    }

    async fn get_klines(&self, window: &KlineWindow) -> Result<serde_json::Value, DataSourceError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let start = window.start_ms.to_string();
        let limit = self.limit.to_string();
        let query = [
            ("symbol", window.symbol.as_str()),
            ("interval", self.interval.as_str()),
            ("startTime", start.as_str()),
            ("limit", limit.as_str()),
        ];
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl MarketDataProvider for KlineMarketData {
    async fn fetch_candles(&self, seed: Option<u64>) -> Result<Vec<Candle>, DataSourceError> {
        let seed = seed.unwrap_or_else(|| Uuid::new_v4().as_u128() as u64);
        let window = self.window_for_seed(seed, TimeMs::now().as_ms());
        debug!(
            "Fetching klines symbol={}, interval={}, start_ms={}, limit={}",
            window.symbol, self.interval, window.start_ms, self.limit
        );

        let response = self.get_klines(&window).await?;
        let rows = response
            .as_array()
            .ok_or_else(|| DataSourceError::ParseError("Expected array response".to_string()))?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_kline(row) {
                Ok(candle) => candles.push(candle),
                Err(e) => warn!("Failed to parse kline: {}", e),
            }
        }
        if candles.is_empty() {
            return Err(DataSourceError::Empty);
        }
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

/// Parse one `[openTime, "open", "high", "low", "close", "volume", ...]` row.
fn parse_kline(row: &serde_json::Value) -> Result<Candle, DataSourceError> {
    let fields = row
        .as_array()
        .ok_or_else(|| DataSourceError::ParseError("Expected kline array".to_string()))?;
    if fields.len() < 5 {
        return Err(DataSourceError::ParseError(format!(
            "Kline has {} fields, need at least 5",
            fields.len()
        )));
    }

    let open_time = fields[0]
        .as_i64()
        .ok_or_else(|| DataSourceError::ParseError("Missing open time".to_string()))?;

    let price = |idx: usize, name: &str| -> Result<Decimal, DataSourceError> {
        let s = fields[idx]
            .as_str()
            .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", name)))?;
        Decimal::from_str_canonical(s)
            .map_err(|e| DataSourceError::ParseError(format!("Invalid {}: {}", name, e)))
    };

    let candle = Candle::new(
        TimeMs::new(open_time),
        price(1, "open")?,
        price(2, "high")?,
        price(3, "low")?,
        price(4, "close")?,
    );
    let candle = match fields.get(5).and_then(|v| v.as_str()) {
        Some(v) => match Decimal::from_str_canonical(v) {
            Ok(volume) => candle.with_volume(volume),
            Err(_) => candle,
        },
        None => candle,
    };

    if !candle.is_well_formed() {
        return Err(DataSourceError::ParseError(format!(
            "Malformed candle at {}",
            open_time
        )));
    }
    Ok(candle)
}
