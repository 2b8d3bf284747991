//! OHLC candle produced by a market data provider.

use crate::domain::{Decimal, Side, TimeMs};
use serde::{Deserialize, Serialize};

/// One period of price history. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub timestamp: TimeMs,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
}

impl Candle {
    pub fn new(
        timestamp: TimeMs,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = Some(volume);
        self
    }

    /// The intra-period extreme that is adverse to `side`: the low for a
    /// long, the high for a short.
    pub fn adverse_extreme(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.low,
            Side::Short => self.high,
        }
    }

    /// Prices must be positive and the high/low must bracket open and close.
    pub fn is_well_formed(&self) -> bool {
        self.low.is_positive()
            && self.low <= self.open
            && self.low <= self.close
            && self.high >= self.open
            && self.high >= self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn candle(o: &str, h: &str, l: &str, c: &str) -> Candle {
        Candle::new(TimeMs::new(0), d(o), d(h), d(l), d(c))
    }

    #[test]
    fn test_adverse_extreme_by_side() {
        let c = candle("100", "110", "90", "105");
        assert_eq!(c.adverse_extreme(Side::Long), d("90"));
        assert_eq!(c.adverse_extreme(Side::Short), d("110"));
    }

    #[test]
    fn test_well_formed() {
        assert!(candle("100", "110", "90", "105").is_well_formed());
        assert!(!candle("100", "99", "90", "95").is_well_formed());
        assert!(!candle("100", "110", "0", "105").is_well_formed());
    }

    #[test]
    fn test_volume_is_optional_in_json() {
        let c = candle("1", "1", "1", "1");
        let json = serde_json::to_value(&c).unwrap();
        assert!(json.get("volume").is_none());

        let with_volume = c.with_volume(d("12.5"));
        let json = serde_json::to_value(&with_volume).unwrap();
        assert_eq!(json["volume"], "12.5");
    }
}
