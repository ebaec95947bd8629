//! Errors surfaced by engines and graphs.

use chan_core::{Frequency, SequenceError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChanError {
    /// A bar arrived behind the last accepted one. The stream halts.
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("{frequency} stream is halted after a sequence error; resync before feeding more bars")]
    Halted { frequency: Frequency },

    #[error("no engine for frequency {0}")]
    UnknownFrequency(Frequency),

    #[error("{received} bar fed to a {expected} stream")]
    FrequencyMismatch {
        expected: Frequency,
        received: Frequency,
    },

    #[error("frequency chain has no levels")]
    EmptyChain,

    #[error("invalid frequency chain: {0}")]
    InvalidChain(String),
}
