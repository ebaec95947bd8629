//! Errors raised by bar sources and aggregators.

use thiserror::Error;

use crate::candle::Timestamp;
use crate::frequency::Frequency;

/// A bar arrived with a timestamp behind the last accepted one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{frequency} bar at {received} is older than last accepted bar at {last}")]
pub struct SequenceError {
    pub frequency: Frequency,
    pub last: Timestamp,
    pub received: Timestamp,
}
