//! Trend segments built from the sequence of confirmed pivots.

use chan_core::Timestamp;

use crate::types::{Pivot, PivotKind, TrendKind, TrendSegment};

/// Change a new pivot made to the trend list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendEvent {
    /// A new consolidating segment started at this position.
    Started(usize),
    /// The segment at this position absorbed the pivot.
    Extended(usize),
    /// The consolidating segment at this position became a trend.
    Confirmed(usize),
}

#[derive(Debug, Clone, Default)]
pub struct TrendTracker {
    trends: Vec<TrendSegment>,
}

impl TrendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trends(&self) -> &[TrendSegment] {
        &self.trends
    }

    /// Fold a newly confirmed pivot, stored at `pivot_index`, into the trend list.
    pub fn process_pivot(&mut self, pivot: &Pivot, pivot_index: usize) -> TrendEvent {
        let at = match self.trends.len() {
            0 => return self.start(pivot, pivot_index),
            len => len - 1,
        };
        let last = &mut self.trends[at];
        let confirms = match (last.kind, pivot.kind) {
            (TrendKind::Rising, PivotKind::Up) | (TrendKind::Falling, PivotKind::Down) => false,
            (TrendKind::ConsolidatingUp, PivotKind::Up)
            | (TrendKind::ConsolidatingDown, PivotKind::Down) => true,
            _ => return self.start(pivot, pivot_index),
        };

        last.end_time = pivot.exit_time;
        last.pivot_indices.push(pivot_index);
        if confirms {
            last.kind = match pivot.kind {
                PivotKind::Up => TrendKind::Rising,
                PivotKind::Down => TrendKind::Falling,
            };
            TrendEvent::Confirmed(at)
        } else {
            TrendEvent::Extended(at)
        }
    }

    /// Note a diverging leg that ended at `end` on the pivot at `pivot_index`.
    pub fn record_divergence(&mut self, pivot_index: usize, end: Timestamp) {
        if let Some(last) = self.trends.last_mut() {
            if last.pivot_indices.contains(&pivot_index) {
                last.divergence_points.push(end);
            }
        }
    }

    fn start(&mut self, pivot: &Pivot, pivot_index: usize) -> TrendEvent {
        let kind = match pivot.kind {
            PivotKind::Up => TrendKind::ConsolidatingUp,
            PivotKind::Down => TrendKind::ConsolidatingDown,
        };
        self.trends.push(TrendSegment {
            start_time: pivot.entry_time,
            end_time: pivot.exit_time,
            kind,
            divergence_points: Vec::new(),
            pivot_indices: vec![pivot_index],
        });
        TrendEvent::Started(self.trends.len() - 1)
    }
}
