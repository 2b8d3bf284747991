use crate::domain::Candle;
use serde::{Deserialize, Serialize};

use super::EngineError;

/// What a clock step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// The newly revealed candle.
    Revealed(Candle),
    /// The sequence is exhausted; nothing changed.
    EndOfData,
}

/// Reveal cursor over a finite candle sequence.
///
/// Candles after `reveal_index` are never handed out, so nothing downstream
/// can look ahead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ClockState")]
pub struct CandleClock {
    candles: Vec<Candle>,
    reveal_index: usize,
}

/// Unchecked wire form; validated on the way in.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClockState {
    candles: Vec<Candle>,
    reveal_index: usize,
}

impl TryFrom<ClockState> for CandleClock {
    type Error = EngineError;

    fn try_from(state: ClockState) -> Result<Self, Self::Error> {
        CandleClock::new(state.candles, state.reveal_index)
    }
}

impl CandleClock {
    /// Build a clock with `initial_reveal` candles of history already visible
    /// (clamped to the last index).
    ///
    /// The sequence must be non-empty, well formed and ordered by
    /// non-decreasing timestamp.
    pub fn new(candles: Vec<Candle>, initial_reveal: usize) -> Result<Self, EngineError> {
        if candles.is_empty() {
            return Err(EngineError::InvalidParameter(
                "candle sequence is empty".to_string(),
            ));
        }
        if let Some(i) = candles.iter().position(|c| !c.is_well_formed()) {
            return Err(EngineError::InvalidParameter(format!(
                "candle {i} is malformed"
            )));
        }
        if candles.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            return Err(EngineError::InvalidParameter(
                "candle timestamps must be non-decreasing".to_string(),
            ));
        }

        let reveal_index = initial_reveal.min(candles.len() - 1);
        Ok(Self {
            candles,
            reveal_index,
        })
    }

    pub fn advance(&mut self) -> Tick {
        if self.is_exhausted() {
            return Tick::EndOfData;
        }
        self.reveal_index += 1;
        Tick::Revealed(self.candles[self.reveal_index].clone())
    }

    /// The most recent visible candle.
    pub fn current(&self) -> &Candle {
        &self.candles[self.reveal_index]
    }

    pub fn reveal_index(&self) -> usize {
        self.reveal_index
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.reveal_index + 1 >= self.candles.len()
    }

    /// Candles `0..=reveal_index`. Call again for a fresh pass.
    pub fn visible_candles(&self) -> impl Iterator<Item = &Candle> + '_ {
        self.candles[..=self.reveal_index].iter()
    }
}
