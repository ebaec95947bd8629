//! Chart frequencies and batch candle aggregation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::candle::{Candle, Timestamp};

/// Chart periods an engine can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "1m")]
    Min1, // base data
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
}

impl Frequency {
    /// Returns the duration of this frequency in seconds.
    pub fn seconds(&self) -> Timestamp {
        match self {
            Frequency::Min1 => 60,
            Frequency::Min5 => 60 * 5,
            Frequency::Min15 => 60 * 15,
            Frequency::Min30 => 60 * 30,
            Frequency::Hour1 => 60 * 60,
            Frequency::Day1 => 60 * 60 * 24,
            Frequency::Week1 => 60 * 60 * 24 * 7,
        }
    }

    /// Returns a short label for this frequency.
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Min1 => "1m",
            Frequency::Min5 => "5m",
            Frequency::Min15 => "15m",
            Frequency::Min30 => "30m",
            Frequency::Hour1 => "1h",
            Frequency::Day1 => "1d",
            Frequency::Week1 => "1w",
        }
    }

    /// Parses a label produced by [`Frequency::label`].
    pub fn from_label(label: &str) -> Option<Frequency> {
        Frequency::all().iter().copied().find(|f| f.label() == label)
    }

    /// Returns all available frequencies, finest first.
    pub fn all() -> &'static [Frequency] {
        &[
            Frequency::Min1,
            Frequency::Min5,
            Frequency::Min15,
            Frequency::Min30,
            Frequency::Hour1,
            Frequency::Day1,
            Frequency::Week1,
        ]
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::from_label(s).ok_or_else(|| format!("unknown frequency label `{s}`"))
    }
}

/// Aggregate candles into a coarser frequency by clock-aligned buckets.
///
/// Each output candle is stamped with its bucket start.
pub fn aggregate_candles(candles: &[Candle], frequency: Frequency) -> Vec<Candle> {
    let interval = frequency.seconds();
    let mut aggregated = Vec::new();
    let mut current: Option<(Timestamp, Candle)> = None;

    for candle in candles {
        let bucket_start = candle.timestamp.div_euclid(interval) * interval;

        if let Some((start, agg)) = current.as_mut() {
            if *start == bucket_start {
                agg.high = agg.high.max(candle.high);
                agg.low = agg.low.min(candle.low);
                agg.close = candle.close;
                agg.volume += candle.volume;
                continue;
            }
        }

        if let Some((_, agg)) = current.take() {
            aggregated.push(agg);
        }
        current = Some((
            bucket_start,
            Candle::new(
                bucket_start,
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume,
            ),
        ));
    }

    if let Some((_, agg)) = current {
        aggregated.push(agg);
    }

    aggregated
}
