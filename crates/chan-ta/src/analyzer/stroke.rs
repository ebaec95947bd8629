//! Strokes: alternating fractals far enough apart to form a leg.

use chan_core::Timestamp;
use chan_indicators::MacdStream;

use super::divergence::{leg_area, AreaCache, LegArea};
use crate::types::{Checkpoint, Fractal, FractalKind, StructureList};

/// Minimum merged-candle distance between the two ends of a stroke.
const MIN_STROKE_GAP: usize = 3;

/// What a fractal did to the stroke list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeUpdate {
    /// The very first stroke point was recorded.
    Started,
    Unchanged,
    /// A stroke was admitted or extended; `corrected` is set when the point
    /// before it was also revised.
    Changed { corrected: bool },
}

/// How to take back everything one bar did.
#[derive(Debug, Clone)]
struct Revision {
    strokes: Checkpoint<Fractal>,
    areas: Vec<(Timestamp, Option<LegArea>)>,
}

#[derive(Debug, Clone, Default)]
pub struct StrokeBuilder {
    strokes: StructureList<Fractal>,
    areas: AreaCache,
    revision: Option<Revision>,
}

impl StrokeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strokes(&self) -> &StructureList<Fractal> {
        &self.strokes
    }

    /// Histogram areas of each stroke, keyed by its end point.
    pub fn areas(&self) -> &AreaCache {
        &self.areas
    }

    /// Start recording the changes of a new bar.
    pub fn begin_bar(&mut self) {
        self.revision = Some(Revision {
            strokes: self.strokes.checkpoint(),
            areas: Vec::new(),
        });
    }

    /// Undo every change since [`begin_bar`](Self::begin_bar).
    pub fn rollback(&mut self) {
        let Some(revision) = self.revision.take() else {
            return;
        };
        self.strokes.restore(revision.strokes);
        for (end, previous) in revision.areas.into_iter().rev() {
            match previous {
                Some(area) => self.areas.insert(end, area),
                None => self.areas.remove(end),
            };
        }
    }

    /// Offer a newly detected fractal. `fractals` is the full fractal list
    /// including `cur`.
    pub fn update(&mut self, fractals: &[Fractal], cur: Fractal, macd: &MacdStream) -> StrokeUpdate {
        let Some(last) = self.strokes.last().copied() else {
            self.strokes.push(cur);
            return StrokeUpdate::Started;
        };

        let changed = if last.kind == cur.kind {
            cur.exceeds(&last) && self.strokes.replace_last(cur)
        } else if admits(&last, &cur) {
            self.strokes.push(cur);
            true
        } else {
            false
        };

        let corrected = changed && self.correct(fractals, &cur, macd);
        self.measure_last(macd);

        if changed {
            StrokeUpdate::Changed { corrected }
        } else {
            StrokeUpdate::Unchanged
        }
    }

    /// Revise the second-to-last point to the most extreme fractal of its
    /// kind that has appeared since.
    fn correct(&mut self, fractals: &[Fractal], cur: &Fractal, macd: &MacdStream) -> bool {
        let len = self.strokes.len();
        if len < 2 {
            return false;
        }
        let anchor = self.strokes[len - 2];
        let mut change = anchor;

        for fx in fractals[..fractals.len().saturating_sub(1)]
            .iter()
            .skip(1)
            .rev()
            .take_while(|fx| fx.timestamp > anchor.timestamp)
        {
            let candidate = match cur.kind {
                FractalKind::Bottom => fx.is_top() && fx.high > change.high,
                FractalKind::Top => fx.is_bottom() && fx.low < change.low,
            };
            if candidate && (len < 3 || cur.index.saturating_sub(fx.index) > MIN_STROKE_GAP) {
                change = *fx;
            }
        }

        if change == anchor {
            return false;
        }
        self.strokes.replace_second_last(change);
        if len > 2 {
            let before = self.strokes[len - 3];
            self.set_area(change.timestamp, leg_area(macd, before.index, change.index));
        }
        true
    }

    fn measure_last(&mut self, macd: &MacdStream) {
        let len = self.strokes.len();
        if len > 1 {
            let (from, to) = (self.strokes[len - 2], self.strokes[len - 1]);
            self.set_area(to.timestamp, leg_area(macd, from.index, to.index));
        }
    }

    fn set_area(&mut self, end: Timestamp, area: LegArea) {
        let previous = self.areas.insert(end, area);
        if let Some(revision) = self.revision.as_mut() {
            revision.areas.push((end, previous));
        }
    }
}

/// Whether `cur` opens a new stroke after `last`. The two must be far enough
/// apart and the new candle must clear the old one's whole range.
fn admits(last: &Fractal, cur: &Fractal) -> bool {
    if cur.index <= last.index || cur.index - last.index <= MIN_STROKE_GAP {
        return false;
    }
    match cur.kind {
        FractalKind::Bottom => cur.high < last.low,
        FractalKind::Top => cur.low > last.high,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chan_indicators::MacdConfig;

    fn fx(kind: FractalKind, index: usize, high: f32, low: f32) -> Fractal {
        Fractal {
            high,
            low,
            timestamp: index as i64,
            kind,
            index,
        }
    }

    fn feed(builder: &mut StrokeBuilder, fractals: &mut Vec<Fractal>, f: Fractal) -> StrokeUpdate {
        fractals.push(f);
        let macd = MacdStream::new(MacdConfig::default());
        builder.update(fractals, f, &macd)
    }

    #[test]
    fn test_admission_needs_gap_and_clearance() {
        let mut builder = StrokeBuilder::new();
        let mut fractals = Vec::new();
        assert_eq!(
            feed(&mut builder, &mut fractals, fx(FractalKind::Top, 0, 20.0, 19.0)),
            StrokeUpdate::Started
        );
        // Too close.
        assert_eq!(
            feed(&mut builder, &mut fractals, fx(FractalKind::Bottom, 3, 11.0, 10.0)),
            StrokeUpdate::Unchanged
        );
        // Far enough but its high overlaps the top's low.
        assert_eq!(
            feed(&mut builder, &mut fractals, fx(FractalKind::Bottom, 5, 19.5, 10.0)),
            StrokeUpdate::Unchanged
        );
        assert_eq!(builder.strokes().len(), 1);
    }

    #[test]
    fn test_same_kind_extends_only_when_more_extreme() {
        let mut builder = StrokeBuilder::new();
        let mut fractals = Vec::new();
        feed(&mut builder, &mut fractals, fx(FractalKind::Top, 0, 20.0, 19.0));
        assert_eq!(
            feed(&mut builder, &mut fractals, fx(FractalKind::Top, 2, 19.0, 18.0)),
            StrokeUpdate::Unchanged
        );
        assert_eq!(
            feed(&mut builder, &mut fractals, fx(FractalKind::Top, 4, 21.0, 20.0)),
            StrokeUpdate::Changed { corrected: false }
        );
        assert_eq!(builder.strokes()[0].index, 4);
    }

    #[test]
    fn test_extension_corrects_previous_point() {
        let mut builder = StrokeBuilder::new();
        let mut fractals = Vec::new();
        feed(&mut builder, &mut fractals, fx(FractalKind::Top, 0, 20.0, 19.0));
        feed(&mut builder, &mut fractals, fx(FractalKind::Bottom, 5, 11.0, 10.0));
        feed(&mut builder, &mut fractals, fx(FractalKind::Top, 10, 18.0, 17.0));
        // A lower bottom too close to the top to open a stroke.
        assert_eq!(
            feed(&mut builder, &mut fractals, fx(FractalKind::Bottom, 12, 9.5, 9.0)),
            StrokeUpdate::Unchanged
        );
        // A higher top extends the stroke, and the lower bottom becomes its start.
        assert_eq!(
            feed(&mut builder, &mut fractals, fx(FractalKind::Top, 17, 25.0, 24.0)),
            StrokeUpdate::Changed { corrected: true }
        );

        let indices: Vec<usize> = builder.strokes().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 12, 17]);
        assert!(builder.areas().get(17).is_some());
        assert!(builder.areas().get(12).is_some());
    }

    #[test]
    fn test_rollback_restores_points_and_areas() {
        let mut builder = StrokeBuilder::new();
        let mut fractals = Vec::new();
        feed(&mut builder, &mut fractals, fx(FractalKind::Top, 0, 20.0, 19.0));
        feed(&mut builder, &mut fractals, fx(FractalKind::Bottom, 5, 11.0, 10.0));
        feed(&mut builder, &mut fractals, fx(FractalKind::Top, 10, 18.0, 17.0));
        feed(&mut builder, &mut fractals, fx(FractalKind::Bottom, 12, 9.5, 9.0));

        builder.begin_bar();
        feed(&mut builder, &mut fractals, fx(FractalKind::Top, 17, 25.0, 24.0));
        assert_eq!(builder.strokes().last().map(|s| s.index), Some(17));

        builder.rollback();
        let indices: Vec<usize> = builder.strokes().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 5, 10]);
        assert!(builder.areas().get(17).is_none());
        assert!(builder.areas().get(12).is_none());
        assert!(builder.areas().get(10).is_some());

        // Nothing recorded: a second rollback is a no-op.
        builder.rollback();
        assert_eq!(builder.strokes().len(), 3);
    }

    #[test]
    fn test_strokes_alternate() {
        let mut builder = StrokeBuilder::new();
        let mut fractals = Vec::new();
        let points = [
            fx(FractalKind::Bottom, 0, 6.0, 5.0),
            fx(FractalKind::Top, 5, 15.0, 14.0),
            fx(FractalKind::Bottom, 10, 9.0, 8.0),
            fx(FractalKind::Top, 15, 18.0, 17.0),
        ];
        for p in points {
            feed(&mut builder, &mut fractals, p);
        }
        let strokes = builder.strokes();
        assert_eq!(strokes.len(), 4);
        assert!(strokes.windows(2).all(|w| w[0].kind != w[1].kind));
    }
}
