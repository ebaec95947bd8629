//! Top and bottom fractal detection on the merged candle sequence.

use chan_core::Candle;

use crate::types::{Checkpoint, Fractal, FractalKind, StructureList};

/// Kinds of fractal the second-to-last of `candles` forms with its neighbours.
///
/// A top is a middle high at least as high as both neighbours; a bottom a
/// middle low at least as low as both. Both may hold on flat data, in which
/// case the top comes first.
pub fn classify(candles: &[Candle]) -> Vec<FractalKind> {
    let n = candles.len();
    if n < 3 {
        return Vec::new();
    }
    let (left, mid, right) = (&candles[n - 3], &candles[n - 2], &candles[n - 1]);
    let mut kinds = Vec::with_capacity(2);
    if mid.high >= right.high && mid.high >= left.high {
        kinds.push(FractalKind::Top);
    }
    if mid.low <= right.low && mid.low <= left.low {
        kinds.push(FractalKind::Bottom);
    }
    kinds
}

/// Keeps every fractal seen so far, oldest first.
#[derive(Debug, Clone, Default)]
pub struct FractalDetector {
    fractals: StructureList<Fractal>,
    /// State before the latest `detect`.
    before: Option<Checkpoint<Fractal>>,
}

impl FractalDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fractals(&self) -> &[Fractal] {
        &self.fractals
    }

    /// Check the newest candle triple. Returns the fractals that fired.
    ///
    /// A fractal firing again on a candle it was already recorded for (the
    /// newest merged candle was rewritten) updates the stored one in place.
    pub fn detect(&mut self, candles: &[Candle]) -> Vec<Fractal> {
        self.before = Some(self.fractals.checkpoint());
        let kinds = classify(candles);
        if kinds.is_empty() {
            return Vec::new();
        }
        let index = candles.len() - 2;
        let mid = &candles[index];

        kinds
            .into_iter()
            .map(|kind| {
                let fractal = Fractal::new(mid, kind, index);
                let same = |f: &Fractal| f.index == index && f.kind == kind;
                let (last, second_last) = (
                    self.fractals.from_end(1).map_or(false, same),
                    self.fractals.from_end(2).map_or(false, same),
                );
                if last {
                    self.fractals.replace_last(fractal);
                } else if second_last {
                    self.fractals.replace_second_last(fractal);
                } else {
                    self.fractals.push(fractal);
                }
                fractal
            })
            .collect()
    }

    /// Undo the latest [`detect`](Self::detect), for a candle sequence
    /// returned to the state it had before it.
    pub fn rollback(&mut self) {
        if let Some(before) = self.before.take() {
            self.fractals.restore(before);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candle(timestamp: i64, high: f32, low: f32) -> Candle {
        Candle::new(timestamp, low, high, low, high, 100.0)
    }

    #[test]
    fn test_needs_three_candles() {
        let candles = vec![make_candle(0, 10.0, 9.0), make_candle(60, 11.0, 10.0)];
        assert!(classify(&candles).is_empty());
    }

    #[test]
    fn test_top_and_bottom() {
        let top = vec![
            make_candle(0, 10.0, 9.0),
            make_candle(60, 12.0, 11.0),
            make_candle(120, 11.0, 10.0),
        ];
        assert_eq!(classify(&top), vec![FractalKind::Top]);

        let bottom = vec![
            make_candle(0, 12.0, 11.0),
            make_candle(60, 10.0, 9.0),
            make_candle(120, 11.0, 10.0),
        ];
        assert_eq!(classify(&bottom), vec![FractalKind::Bottom]);
    }

    #[test]
    fn test_flat_triple_fires_both_top_first() {
        let flat = vec![
            make_candle(0, 10.0, 9.0),
            make_candle(60, 10.0, 9.0),
            make_candle(120, 10.0, 9.0),
        ];
        assert_eq!(classify(&flat), vec![FractalKind::Top, FractalKind::Bottom]);
    }

    #[test]
    fn test_refire_on_same_candle_updates_in_place() {
        let mut detector = FractalDetector::new();
        let mut candles = vec![
            make_candle(0, 10.0, 9.0),
            make_candle(60, 12.0, 11.0),
            make_candle(120, 11.0, 10.0),
        ];
        let fired = detector.detect(&candles);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].index, 1);

        // Newest candle rewritten, still lower: the same top fires again.
        candles[2] = make_candle(180, 10.5, 10.0);
        detector.detect(&candles);
        assert_eq!(detector.fractals().len(), 1);

        candles.push(make_candle(240, 10.0, 8.0));
        candles.push(make_candle(300, 11.0, 9.0));
        let fired = detector.detect(&candles);
        assert_eq!(fired[0].kind, FractalKind::Bottom);
        assert_eq!(fired[0].index, 3);
        assert_eq!(detector.fractals().len(), 2);
    }

    #[test]
    fn test_rollback_drops_fractal_of_replaced_candle() {
        let mut detector = FractalDetector::new();
        let mut candles = vec![make_candle(0, 10.0, 9.0), make_candle(60, 12.0, 11.0)];
        assert!(detector.detect(&candles).is_empty());

        candles.push(make_candle(120, 11.0, 10.0));
        assert_eq!(detector.detect(&candles).len(), 1);

        // The newest candle is replaced by a higher one: no top any more.
        detector.rollback();
        candles[2] = make_candle(120, 13.0, 12.0);
        assert!(detector.detect(&candles).is_empty());
        assert!(detector.fractals().is_empty());
    }
}
