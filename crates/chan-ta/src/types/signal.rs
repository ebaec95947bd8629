//! Buy and sell points.

use std::fmt;

use chan_core::Timestamp;
use serde::{Deserialize, Serialize};

use super::pivot::NestedEvidence;

/// Position of a signal in its engine's signal arena.
pub type SignalId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalSide {
    Buy,
    Sell,
}

/// First, second and third-type buy and sell points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    B1,
    B2,
    B3,
    S1,
    S2,
    S3,
}

impl SignalType {
    pub fn side(self) -> SignalSide {
        match self {
            SignalType::B1 | SignalType::B2 | SignalType::B3 => SignalSide::Buy,
            SignalType::S1 | SignalType::S2 | SignalType::S3 => SignalSide::Sell,
        }
    }

    /// Slot position on a pivot: 0 for first-type, 1 second, 2 third.
    pub fn slot(self) -> usize {
        match self {
            SignalType::B1 | SignalType::S1 => 0,
            SignalType::B2 | SignalType::S2 => 1,
            SignalType::B3 | SignalType::S3 => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SignalType::B1 => "B1",
            SignalType::B2 => "B2",
            SignalType::B3 => "B3",
            SignalType::S1 => "S1",
            SignalType::S2 => "S2",
            SignalType::S3 => "S3",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether the move a signal belongs to is a trend (the last two pivots
/// share a kind) or a consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveClass {
    Trend,
    Consolidation,
}

/// Strength class of second and third-type buys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strength {
    Weak,
    Medium,
    Strong,
    SuperStrong,
}

/// A buy or sell point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Timestamp of the structural point the signal sits on.
    pub timestamp: Timestamp,
    pub price: f32,
    pub kind: SignalType,
    /// Bar timestamp at which the signal was confirmed.
    pub evaluated_at: Timestamp,
    /// Index of the structural point in the stroke or segment list.
    pub anchor_index: usize,
    pub valid: bool,
    pub invalidated_at: Option<Timestamp>,
    pub move_class: MoveClass,
    pub strength: Option<Strength>,
    /// Finer-frequency pivots used to confirm the signal.
    pub nested: Vec<NestedEvidence>,
}

impl Signal {
    pub fn side(&self) -> SignalSide {
        self.kind.side()
    }

    /// Mark the signal invalid. The first invalidation time is kept.
    pub fn invalidate(&mut self, at: Timestamp) {
        self.valid = false;
        if self.invalidated_at.is_none() {
            self.invalidated_at = Some(at);
        }
    }
}
