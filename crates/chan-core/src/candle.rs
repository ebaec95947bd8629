//! Candle and bar data structures.

use serde::{Deserialize, Serialize};

use crate::frequency::Frequency;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: Timestamp,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: f32,
}

impl Candle {
    pub fn new(timestamp: Timestamp, open: f32, high: f32, low: f32, close: f32, volume: f32) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Whether either candle's high/low range contains the other's.
    pub fn contains_or_within(&self, other: &Candle) -> bool {
        (self.high >= other.high && self.low <= other.low)
            || (self.high <= other.high && self.low >= other.low)
    }
}

/// A candle as delivered by a feed: tagged with instrument and frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub exchange: String,
    pub timestamp: Timestamp,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: f32,
    pub frequency: Frequency,
}

impl Bar {
    pub fn new(symbol: &str, exchange: &str, frequency: Frequency, candle: Candle) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            timestamp: candle.timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            frequency,
        }
    }

    /// The OHLCV part of this bar.
    pub fn candle(&self) -> Candle {
        Candle::new(
            self.timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}
