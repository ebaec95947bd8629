//! Pivots (consolidation zones).

use chan_core::{Frequency, Timestamp};
use serde::{Deserialize, Serialize};

use super::signal::{SignalId, SignalSide};

/// Direction of the move a pivot sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PivotKind {
    Up,
    Down,
}

/// An overlap zone of three consecutive structural moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub kind: PivotKind,
    pub entry_time: Timestamp,
    /// Moves forward while the pivot is extended.
    pub exit_time: Timestamp,
    /// Lower bound of the overlap.
    pub zd: f32,
    /// Upper bound of the overlap.
    pub zg: f32,
    /// Highest high of the bounding points.
    pub gg: f32,
    /// Lowest low of the bounding points.
    pub dd: f32,
    pub entry_index: usize,
    pub exit_index: usize,
    /// Timestamp of the point that completed the pivot.
    pub formed_at: Timestamp,
    /// Current B1/B2/B3 candidates.
    pub buy: [Option<SignalId>; 3],
    /// Current S1/S2/S3 candidates.
    pub sell: [Option<SignalId>; 3],
    /// (start, end) of every leg that diverged while the pivot was open.
    pub divergences: Vec<(Timestamp, Timestamp)>,
}

impl Pivot {
    pub fn slots(&self, side: SignalSide) -> &[Option<SignalId>; 3] {
        match side {
            SignalSide::Buy => &self.buy,
            SignalSide::Sell => &self.sell,
        }
    }

    pub fn slots_mut(&mut self, side: SignalSide) -> &mut [Option<SignalId>; 3] {
        match side {
            SignalSide::Buy => &mut self.buy,
            SignalSide::Sell => &mut self.sell,
        }
    }

    /// Whether the zone lies entirely above `other`.
    pub fn above(&self, other: &Pivot) -> bool {
        self.zd > other.zg
    }

    /// Whether the zone lies entirely below `other`.
    pub fn below(&self, other: &Pivot) -> bool {
        self.zg < other.zd
    }

    pub fn summary(&self) -> NestedPivot {
        NestedPivot {
            kind: self.kind,
            entry_time: self.entry_time,
            exit_time: self.exit_time,
            zd: self.zd,
            zg: self.zg,
            divergences: self.divergences.clone(),
        }
    }
}

/// A pivot re-derived on a finer frequency while confirming a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedPivot {
    pub kind: PivotKind,
    pub entry_time: Timestamp,
    pub exit_time: Timestamp,
    pub zd: f32,
    pub zg: f32,
    pub divergences: Vec<(Timestamp, Timestamp)>,
}

/// The pivots one finer frequency produced for a confirmation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedEvidence {
    pub frequency: Frequency,
    pub pivots: Vec<NestedPivot>,
}
