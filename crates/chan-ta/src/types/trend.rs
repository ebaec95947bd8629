//! Trend segments derived from the pivot sequence.

use chan_core::Timestamp;
use serde::{Deserialize, Serialize};

/// Kind of a trend segment.
///
/// A consolidating segment becomes rising or falling once a second pivot of
/// the same kind confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendKind {
    Rising,
    Falling,
    ConsolidatingUp,
    ConsolidatingDown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSegment {
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub kind: TrendKind,
    /// End timestamps of diverging legs seen on this segment's pivots.
    pub divergence_points: Vec<Timestamp>,
    /// Indices into the pivot list.
    pub pivot_indices: Vec<usize>,
}
