//! Segments: fractals one level up, found on the stroke sequence.

use std::collections::BTreeMap;

use chan_core::Timestamp;
use chan_indicators::MacdStream;

use super::divergence::{leg_area, AreaCache, LegArea};
use crate::types::{Checkpoint, Fractal, FractalKind, StructureList};

/// Strokes needed before a segment boundary can be tested.
const MIN_STROKES: usize = 5;
/// Minimum stroke distance between two segment boundaries.
const MIN_SEGMENT_GAP: usize = 2;

#[derive(Debug, Clone)]
struct Revision {
    segments: Checkpoint<Fractal>,
    positions: Vec<(Timestamp, Option<usize>)>,
    areas: Vec<(Timestamp, Option<LegArea>)>,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentBuilder {
    segments: StructureList<Fractal>,
    /// Stroke-list position of each segment boundary.
    positions: BTreeMap<Timestamp, usize>,
    areas: AreaCache,
    revision: Option<Revision>,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &StructureList<Fractal> {
        &self.segments
    }

    pub fn areas(&self) -> &AreaCache {
        &self.areas
    }

    /// Stroke-list position of the boundary at `timestamp`.
    pub fn position(&self, timestamp: Timestamp) -> Option<usize> {
        self.positions.get(&timestamp).copied()
    }

    /// Start recording the changes of a new bar.
    pub fn begin_bar(&mut self) {
        self.revision = Some(Revision {
            segments: self.segments.checkpoint(),
            positions: Vec::new(),
            areas: Vec::new(),
        });
    }

    /// Undo every change since [`begin_bar`](Self::begin_bar).
    pub fn rollback(&mut self) {
        let Some(revision) = self.revision.take() else {
            return;
        };
        self.segments.restore(revision.segments);
        for (timestamp, previous) in revision.positions.into_iter().rev() {
            match previous {
                Some(position) => self.positions.insert(timestamp, position),
                None => self.positions.remove(&timestamp),
            };
        }
        for (end, previous) in revision.areas.into_iter().rev() {
            match previous {
                Some(area) => self.areas.insert(end, area),
                None => self.areas.remove(end),
            };
        }
    }

    /// Re-examine the stroke list after it changed. Returns true if the
    /// segment list changed.
    pub fn update(&mut self, strokes: &[Fractal], macd: &MacdStream) -> bool {
        let n = strokes.len();
        if n < MIN_STROKES {
            return false;
        }
        let newest = strokes[n - 1];
        let mid = strokes[n - 3];
        let far = strokes[n - 5];

        let changed = match newest.kind {
            FractalKind::Top if mid.high >= newest.high && mid.high >= far.high => {
                self.offer(mid, n - 3)
            }
            FractalKind::Bottom if mid.low <= newest.low && mid.low <= far.low => {
                self.offer(mid, n - 3)
            }
            _ => false,
        };

        if changed && self.segments.len() > 1 {
            self.correct(strokes, macd);
        }
        let len = self.segments.len();
        if len > 1 {
            let (from, to) = (self.segments[len - 2], self.segments[len - 1]);
            self.set_area(to.timestamp, leg_area(macd, from.index, to.index));
        }
        changed
    }

    /// Open a new segment at `point`, or extend the open one.
    fn offer(&mut self, point: Fractal, position: usize) -> bool {
        let Some(last) = self.segments.last().copied() else {
            self.segments.push(point);
            self.set_position(point.timestamp, position);
            return true;
        };

        if last.kind == point.kind {
            if point.exceeds(&last) {
                self.segments.replace_last(point);
                self.set_position(point.timestamp, position);
                return true;
            }
            return false;
        }

        let gap = self.position(last.timestamp).map_or(true, |at| {
            position as i64 - at as i64 > MIN_SEGMENT_GAP as i64
        });
        let clears = match point.kind {
            FractalKind::Top => last.low < point.high,
            FractalKind::Bottom => last.high > point.low,
        };
        if gap && clears {
            self.segments.push(point);
            self.set_position(point.timestamp, position);
            return true;
        }
        false
    }

    /// Sample every other stroke back to the previous boundary for a more
    /// extreme start of the newest segment.
    fn correct(&mut self, strokes: &[Fractal], macd: &MacdStream) {
        let len = self.segments.len();
        let previous = self.segments[len - 2];
        let newest = self.segments[len - 1];
        let (Some(previous_at), Some(newest_at)) =
            (self.position(previous.timestamp), self.position(newest.timestamp))
        else {
            return;
        };
        if newest_at <= previous_at || newest_at - previous_at <= 3 {
            return;
        }

        let n = strokes.len();
        let mut change = previous;
        let mut change_at = previous_at;
        let mut back = 6;
        while n >= back + 2 && strokes[n - back].timestamp > previous.timestamp {
            let at = n - back;
            let (p, next, before) = (strokes[at], strokes[at + 2], strokes[at - 2]);
            let better = match newest.kind {
                FractalKind::Bottom => {
                    p.high > next.high && p.high > before.high && p.high > change.high
                }
                FractalKind::Top => p.low < next.low && p.low < before.low && p.low < change.low,
            };
            if better {
                change = p;
                change_at = at;
            }
            back += 2;
        }

        if change == previous {
            return;
        }
        self.set_position(change.timestamp, change_at);
        self.segments.replace_second_last(change);
        if len > 2 {
            let before = self.segments[len - 3];
            self.set_area(change.timestamp, leg_area(macd, before.index, change.index));
        }
    }
}

impl SegmentBuilder {
    fn set_position(&mut self, timestamp: Timestamp, position: usize) {
        let previous = self.positions.insert(timestamp, position);
        if let Some(revision) = self.revision.as_mut() {
            revision.positions.push((timestamp, previous));
        }
    }

    fn set_area(&mut self, end: Timestamp, area: LegArea) {
        let previous = self.areas.insert(end, area);
        if let Some(revision) = self.revision.as_mut() {
            revision.areas.push((end, previous));
        }
    }
}
