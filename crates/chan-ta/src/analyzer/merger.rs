//! Containment merging of raw candles.

use chan_core::Candle;

/// How the newest merged candle came about, kept so a repeated bar can be
/// re-applied against the state before it.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MergeStep {
    Appended,
    Merged { replaced: Candle },
}

/// Folds candles whose high/low range contains, or lies within, the last
/// merged candle into it.
///
/// The merge direction follows the last two merged candles: rising while the
/// last high is above the one before it, falling otherwise. A rising merge
/// keeps the maxima of high, low, open and close; a falling merge keeps the
/// minima. The merged candle carries the newest candle's timestamp.
#[derive(Debug, Clone)]
pub struct CandleMerger {
    include_containment: bool,
    candles: Vec<Candle>,
    last_step: Option<MergeStep>,
}

impl CandleMerger {
    pub fn new(include_containment: bool) -> Self {
        Self {
            include_containment,
            candles: Vec::new(),
            last_step: None,
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Apply a new candle. Returns true if it was folded into the last one.
    pub fn push(&mut self, candle: Candle) -> bool {
        let step = self.apply(candle);
        self.last_step = Some(step);
        matches!(step, MergeStep::Merged { .. })
    }

    /// Apply a candle carrying the same timestamp as the previous one. The
    /// previous candle's effect is undone first.
    pub fn replace(&mut self, candle: Candle) -> bool {
        match self.last_step.take() {
            Some(MergeStep::Appended) => {
                self.candles.pop();
            }
            Some(MergeStep::Merged { replaced }) => {
                if let Some(last) = self.candles.last_mut() {
                    *last = replaced;
                }
            }
            None => {}
        }
        self.push(candle)
    }

    fn apply(&mut self, candle: Candle) -> MergeStep {
        let len = self.candles.len();
        if !self.include_containment || len < 2 {
            self.candles.push(candle);
            return MergeStep::Appended;
        }
        let pre = self.candles[len - 2];
        let last = self.candles[len - 1];
        if !last.contains_or_within(&candle) {
            self.candles.push(candle);
            return MergeStep::Appended;
        }

        let rising = last.high > pre.high;
        let pick = |a: f32, b: f32| if rising { a.max(b) } else { a.min(b) };
        let merged = Candle {
            timestamp: candle.timestamp,
            open: pick(last.open, candle.open),
            high: pick(last.high, candle.high),
            low: pick(last.low, candle.low),
            close: pick(last.close, candle.close),
            volume: candle.volume,
        };
        self.candles[len - 1] = merged;
        MergeStep::Merged { replaced: last }
    }
}
