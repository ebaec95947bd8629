//! The per-frequency engine and the graph that chains frequencies together.
//!
//! Each bar flows through a fixed pipeline:
//! 1. Candle merging: contained candles fold into the last merged one
//! 2. Fractal detection on the newest merged triple
//! 3. Strokes and segments, each revisable one point back
//! 4. Pivots and the buy/sell points read off them
//!
//! Engines only read each other through [`EngineView`].

mod divergence;
mod engine;
mod fractal;
mod graph;
mod merger;
mod nested;
mod pivot;
mod segment;
mod stroke;
mod trend;

pub use divergence::{leg_area, on_turn, AreaCache, Leg, LegArea};
pub use engine::{ChanEngine, EngineSnapshot};
pub use fractal::{classify, FractalDetector};
pub use graph::{ChanGraph, GraphUpdate};
pub use merger::CandleMerger;
pub use nested::{confirm_trend, confirm_turn, sub_pivots, window};
pub use pivot::{Confirmation, PivotContext, PivotEngine, PivotUpdate};
pub use segment::SegmentBuilder;
pub use stroke::{StrokeBuilder, StrokeUpdate};
pub use trend::{TrendEvent, TrendTracker};

use chan_core::{Frequency, Timestamp};

use crate::types::{Fractal, Signal, SignalSide};

/// Result of processing one bar on one frequency.
#[derive(Debug, Default, Clone)]
pub struct AnalysisResult {
    /// Whether the bar was folded into the previous merged candle.
    pub merged: bool,
    /// Fractals that fired on this bar.
    pub fractals: Vec<Fractal>,
    /// Whether the stroke list changed.
    pub strokes_changed: bool,
    /// Whether the segment list changed.
    pub segments_changed: bool,
    /// Index of a pivot formed on this bar.
    pub pivot_formed: Option<usize>,
    /// Signals emitted on this bar, including re-derived and released ones.
    pub signals: Vec<Signal>,
}

/// A confirmed buy or sell as reported to a [`SignalHandler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalEvent {
    pub side: SignalSide,
    pub price: f32,
    pub volume: f32,
    pub frequency: Frequency,
}

/// Receives buy and sell callbacks the moment a signal is confirmed.
pub trait SignalHandler: Send {
    fn on_buy(&mut self, price: f32, volume: f32, frequency: Frequency);
    fn on_sell(&mut self, price: f32, volume: f32, frequency: Frequency);
}

/// Ignores every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl SignalHandler for NullHandler {
    fn on_buy(&mut self, _price: f32, _volume: f32, _frequency: Frequency) {}
    fn on_sell(&mut self, _price: f32, _volume: f32, _frequency: Frequency) {}
}

/// Keeps every callback, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingHandler {
    pub events: Vec<SignalEvent>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buys(&self) -> impl Iterator<Item = &SignalEvent> + '_ {
        self.events.iter().filter(|e| e.side == SignalSide::Buy)
    }

    pub fn sells(&self) -> impl Iterator<Item = &SignalEvent> + '_ {
        self.events.iter().filter(|e| e.side == SignalSide::Sell)
    }
}

impl SignalHandler for RecordingHandler {
    fn on_buy(&mut self, price: f32, volume: f32, frequency: Frequency) {
        self.events.push(SignalEvent {
            side: SignalSide::Buy,
            price,
            volume,
            frequency,
        });
    }

    fn on_sell(&mut self, price: f32, volume: f32, frequency: Frequency) {
        self.events.push(SignalEvent {
            side: SignalSide::Sell,
            price,
            volume,
            frequency,
        });
    }
}

/// Read-only view of an engine, as seen by coarser engines.
pub trait EngineView {
    /// Log prefix, `SYMBOL FREQ`.
    fn label(&self) -> &str;

    fn frequency(&self) -> Frequency;

    /// The points pivots are built from: segments or strokes.
    fn structure(&self) -> &[Fractal];

    /// Histogram areas of the legs in [`structure`](Self::structure).
    fn structure_areas(&self) -> &AreaCache;

    /// Timestamp of the newest merged candle.
    fn last_candle_time(&self) -> Option<Timestamp>;

    fn third_type_lookback(&self) -> usize;

    /// Number of buys emitted so far.
    fn buy_count(&self) -> usize;
}
