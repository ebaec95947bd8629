//! MACD-area divergence between the leg entering a pivot and the leg leaving it.

use std::collections::BTreeMap;

use chan_core::Timestamp;
use chan_indicators::MacdStream;
use serde::{Deserialize, Serialize};

use crate::types::{Fractal, PivotKind};

/// Histogram area under one leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LegArea {
    Measured(f64),
    /// Part of the leg lies before the histogram has warmed up.
    Insufficient,
}

impl LegArea {
    /// A zero area carries no momentum information.
    fn is_present(&self) -> bool {
        match self {
            LegArea::Measured(area) => *area != 0.0,
            LegArea::Insufficient => true,
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Sum of absolute histogram values over merged candles `start..=end`.
pub fn leg_area(macd: &MacdStream, start: usize, end: usize) -> LegArea {
    if start >= end {
        return LegArea::Measured(0.0);
    }
    let mut sum = 0.0;
    for index in start..=end {
        match macd.histogram(index) {
            Some(hist) => sum += round4(hist).abs(),
            None => return LegArea::Insufficient,
        }
    }
    LegArea::Measured(round4(sum))
}

/// Leg areas keyed by the timestamp of the point that ends the leg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaCache {
    areas: BTreeMap<Timestamp, LegArea>,
}

impl AreaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the area of the leg ending at `end`, returning the one it replaced.
    pub fn insert(&mut self, end: Timestamp, area: LegArea) -> Option<LegArea> {
        self.areas.insert(end, area)
    }

    pub fn remove(&mut self, end: Timestamp) -> Option<LegArea> {
        self.areas.remove(&end)
    }

    pub fn get(&self, end: Timestamp) -> Option<LegArea> {
        self.areas.get(&end).copied()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

/// A leg between two structural points, oldest first.
pub type Leg = (Fractal, Fractal);

fn slope(leg: &Leg, kind: PivotKind) -> f32 {
    let (from, to) = leg;
    let bars = to.index as f32 - from.index as f32 + 1.0;
    match kind {
        PivotKind::Down => (from.high - to.low) / bars,
        PivotKind::Up => (from.low - to.high) / bars,
    }
}

/// Whether the leg ending at `exit` is weaker than the one ending at `enter`.
///
/// `legs` holds the entering and exiting legs and is only consulted when an
/// area could not be measured.
pub fn on_turn(
    areas: &AreaCache,
    enter: Timestamp,
    exit: Timestamp,
    legs: &[Leg],
    kind: PivotKind,
) -> bool {
    let (Some(enter_area), Some(exit_area)) = (areas.get(enter), areas.get(exit)) else {
        return false;
    };
    if !enter_area.is_present() || !exit_area.is_present() {
        return false;
    }
    match (enter_area, exit_area) {
        (LegArea::Measured(a), LegArea::Measured(b)) => a > b,
        _ => {
            if legs.len() < 2 {
                return false;
            }
            let enter_slope = slope(&legs[0], kind);
            let exit_slope = slope(&legs[legs.len() - 1], kind);
            enter_slope.abs() > exit_slope.abs()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FractalKind;
    use chan_indicators::MacdConfig;

    fn point(kind: FractalKind, high: f32, low: f32, index: usize) -> Fractal {
        Fractal {
            high,
            low,
            timestamp: index as i64 * 60,
            kind,
            index,
        }
    }

    fn stream(prices: &[f64]) -> MacdStream {
        let mut macd = MacdStream::new(MacdConfig::new(2, 3, 2));
        for &price in prices {
            macd.push(price);
        }
        macd
    }

    #[test]
    fn test_leg_area_empty_leg_is_zero() {
        let macd = stream(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(leg_area(&macd, 4, 4), LegArea::Measured(0.0));
        assert_eq!(leg_area(&macd, 4, 2), LegArea::Measured(0.0));
    }

    #[test]
    fn test_leg_area_before_warmup_is_insufficient() {
        let macd = stream(&[1.0, 2.0, 4.0, 3.0, 5.0, 2.0]);
        assert_eq!(macd.first_valid_index(), 3);
        assert_eq!(leg_area(&macd, 1, 5), LegArea::Insufficient);
        assert_eq!(leg_area(&macd, 3, 9), LegArea::Insufficient);
    }

    #[test]
    fn test_leg_area_sums_absolute_histogram() {
        let prices = [1.0, 2.0, 4.0, 3.0, 5.0, 2.0, 6.0];
        let macd = stream(&prices);
        let expected: f64 = (3..=6)
            .map(|i| round4(macd.histogram(i).unwrap()).abs())
            .sum();
        match leg_area(&macd, 3, 6) {
            LegArea::Measured(area) => {
                assert!(area > 0.0);
                assert!((area - round4(expected)).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_on_turn_compares_areas() {
        let mut areas = AreaCache::new();
        areas.insert(100, LegArea::Measured(50.0));
        areas.insert(200, LegArea::Measured(20.0));
        assert!(on_turn(&areas, 100, 200, &[], PivotKind::Down));
        assert!(!on_turn(&areas, 200, 100, &[], PivotKind::Down));
    }

    #[test]
    fn test_on_turn_missing_or_zero_area() {
        let mut areas = AreaCache::new();
        areas.insert(100, LegArea::Measured(50.0));
        areas.insert(200, LegArea::Measured(0.0));
        assert!(!on_turn(&areas, 100, 200, &[], PivotKind::Down));
        assert!(!on_turn(&areas, 100, 300, &[], PivotKind::Down));
    }

    #[test]
    fn test_on_turn_slope_fallback() {
        let mut areas = AreaCache::new();
        areas.insert(120, LegArea::Insufficient);
        areas.insert(600, LegArea::Measured(3.0));

        // Steep fall over 3 bars, then a shallow fall over 6.
        let legs = [
            (
                point(FractalKind::Top, 20.0, 19.0, 0),
                point(FractalKind::Bottom, 9.0, 8.0, 2),
            ),
            (
                point(FractalKind::Top, 12.0, 11.0, 5),
                point(FractalKind::Bottom, 7.0, 6.0, 10),
            ),
        ];
        assert!(on_turn(&areas, 120, 600, &legs, PivotKind::Down));

        // A single leg cannot be compared.
        assert!(!on_turn(&areas, 120, 600, &legs[..1], PivotKind::Down));
    }
}
