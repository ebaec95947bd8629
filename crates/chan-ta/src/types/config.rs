//! Configuration types for the engine.

use chan_core::{AggregatorConfig, Frequency, WindowBoundary};
use chan_indicators::MacdConfig;

/// Configuration for one per-frequency engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Merge candles whose ranges contain one another before fractal detection.
    pub include_containment: bool,
    /// Build pivots from segments instead of strokes.
    pub build_pivot_from_segments: bool,
    /// Confirm first-type signals by divergence, and other signals by the
    /// existence of structure, on the finer frequencies.
    pub use_nested_interval: bool,
    /// Hold first-type buys until the next finer frequency confirms a buy.
    /// Only takes effect on the coarsest engine of a graph.
    pub use_resonance: bool,
    /// Bars a held buy may wait for resonance.
    pub resonance_max_delay: usize,
    /// Points back the third-type re-reversal guard inspects.
    pub third_type_lookback: usize,
    /// Volume passed to buy/sell callbacks.
    pub volume_hint: f32,
    pub macd: MacdConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_containment(mut self, enabled: bool) -> Self {
        self.include_containment = enabled;
        self
    }

    pub fn with_segment_pivots(mut self, enabled: bool) -> Self {
        self.build_pivot_from_segments = enabled;
        self
    }

    pub fn with_nested_interval(mut self, enabled: bool) -> Self {
        self.use_nested_interval = enabled;
        self
    }

    pub fn with_resonance(mut self, enabled: bool) -> Self {
        self.use_resonance = enabled;
        self
    }

    pub fn with_macd(mut self, macd: MacdConfig) -> Self {
        self.macd = macd;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            include_containment: true,
            build_pivot_from_segments: false,
            use_nested_interval: true,
            use_resonance: false,
            resonance_max_delay: 12,
            third_type_lookback: 3,
            volume_hint: 100.0,
            macd: MacdConfig::default(),
        }
    }
}

/// One frequency of a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelConfig {
    pub frequency: Frequency,
    /// Base bars per window. Ignored for the base level.
    pub window: usize,
    pub boundary: WindowBoundary,
    pub engine: EngineConfig,
}

impl LevelConfig {
    pub fn new(frequency: Frequency, window: usize) -> Self {
        Self {
            frequency,
            window,
            boundary: WindowBoundary::Interval,
            engine: EngineConfig::default(),
        }
    }

    /// The base level, fed directly.
    pub fn base(frequency: Frequency) -> Self {
        Self {
            frequency,
            window: 1,
            boundary: WindowBoundary::None,
            engine: EngineConfig::default(),
        }
    }

    pub fn with_boundary(mut self, boundary: WindowBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig::new(self.window, self.frequency).with_boundary(self.boundary)
    }
}

/// A chain of frequencies for one symbol, coarsest first.
/// The last level receives the base feed.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphConfig {
    pub symbol: String,
    pub exchange: String,
    pub levels: Vec<LevelConfig>,
}

impl GraphConfig {
    pub fn new(symbol: &str, exchange: &str, levels: Vec<LevelConfig>) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            levels,
        }
    }

    /// Daily, 30-minute, 5-minute and 1-minute levels fed by 1-minute bars.
    pub fn default_chain(symbol: &str, exchange: &str) -> Self {
        Self::new(
            symbol,
            exchange,
            vec![
                LevelConfig::new(Frequency::Day1, 240)
                    .with_boundary(WindowBoundary::TradingDay { utc_offset: 8 * 3600 }),
                LevelConfig::new(Frequency::Min30, 30),
                LevelConfig::new(Frequency::Min5, 5),
                LevelConfig::base(Frequency::Min1),
            ],
        )
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
