//! Chan Theory structure analysis - incremental, multi-frequency.
//!
//! This crate turns a stream of bars into the structures of Chan theory and
//! reads buy and sell points off them, one bar at a time. Every structure is
//! revisable only at its tail, so each bar costs amortised constant work.
//!
//! # Core Concepts
//!
//! - **Merged candles**: raw candles with containment folded away
//! - **Fractals**: local tops and bottoms of three merged candles
//! - **Strokes / Segments**: alternating fractals far enough apart, and the
//!   higher-order swings built from strokes
//! - **Pivots**: the overlap zone of three consecutive legs, with the
//!   first, second and third-type signals derived from it
//!
//! # Architecture
//!
//! A [`ChanGraph`] owns one [`ChanEngine`] per frequency, coarsest first. Base
//! bars are aggregated into each coarser frequency. When a coarse engine sees a
//! divergence it confirms it on the finer engines before emitting a signal.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chan_ta::{ChanGraph, GraphConfig, RecordingHandler};
//!
//! let config = GraphConfig::default_chain("IF888", "CFFEX");
//! let mut graph = ChanGraph::with_handler(config, RecordingHandler::new())?;
//!
//! for bar in &bars {
//!     graph.on_bar(bar)?;
//! }
//! for event in graph.handler().buys() {
//!     println!("buy at {} on {}", event.price, event.frequency);
//! }
//! ```

pub mod analyzer;
pub mod error;
pub mod types;

pub use analyzer::{
    AnalysisResult, AreaCache, CandleMerger, ChanEngine, ChanGraph, EngineSnapshot, EngineView,
    FractalDetector, GraphUpdate, LegArea, NullHandler, PivotEngine, RecordingHandler,
    SegmentBuilder, SignalEvent, SignalHandler, StrokeBuilder,
};

pub use error::ChanError;

pub use types::{
    EngineConfig, Fractal, FractalKind, GraphConfig, LevelConfig, MoveClass, NestedEvidence,
    NestedPivot, Pivot, PivotKind, Signal, SignalId, SignalSide, SignalType, Strength, TrendKind,
    TrendSegment,
};
