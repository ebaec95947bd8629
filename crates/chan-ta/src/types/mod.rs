//! Core types for structure analysis.

pub mod config;
pub mod fractal;
pub mod pivot;
pub mod signal;
pub mod trend;

pub use config::{EngineConfig, GraphConfig, LevelConfig};
pub use fractal::{Checkpoint, Fractal, FractalKind, StructureList};
pub use pivot::{NestedEvidence, NestedPivot, Pivot, PivotKind};
pub use signal::{MoveClass, Signal, SignalId, SignalSide, SignalType, Strength};
pub use trend::{TrendKind, TrendSegment};
