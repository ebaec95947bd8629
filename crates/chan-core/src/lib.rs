//! Core types for the chan workspace.
//!
//! This crate provides the market data primitives the engine consumes:
//! - `Candle` - OHLCV values at a timestamp
//! - `Bar` - a candle tagged with symbol, exchange and frequency
//! - `Frequency` - chart periods and batch aggregation
//! - `BarAggregator` - incremental base-to-coarse window aggregation

pub mod aggregator;
pub mod candle;
pub mod error;
pub mod frequency;

pub use aggregator::{AggregatorConfig, BarAggregator, WindowBoundary};
pub use candle::{Bar, Candle, Timestamp};
pub use error::SequenceError;
pub use frequency::{aggregate_candles, Frequency};
