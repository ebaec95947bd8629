//! A chain of engines for one symbol, coarsest first, fed by one base stream.

use chan_core::{Bar, BarAggregator, Frequency};

use super::engine::{ChanEngine, EngineSnapshot};
use super::{AnalysisResult, NullHandler, SignalHandler};
use crate::error::ChanError;
use crate::types::GraphConfig;

/// Per-level results of one base bar, coarsest first. A level appears once
/// per bar it received, so it may be absent or appear twice.
#[derive(Debug, Default, Clone)]
pub struct GraphUpdate {
    pub levels: Vec<(Frequency, AnalysisResult)>,
}

impl GraphUpdate {
    /// Results for one frequency.
    pub fn for_frequency(&self, frequency: Frequency) -> impl Iterator<Item = &AnalysisResult> + '_ {
        self.levels
            .iter()
            .filter(move |(f, _)| *f == frequency)
            .map(|(_, result)| result)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Owns every engine of one symbol and routes base bars through them.
///
/// Each coarser level gets its bars from an aggregator over the base stream.
/// Levels are processed coarsest first, and each engine sees the engines
/// finer than itself.
///
/// A repeated base bar reaches a coarser level only while its window is still
/// open. Once the window bar has been emitted the repeat is dropped there, so
/// that level keeps the close it was built with.
#[derive(Debug)]
pub struct ChanGraph<H: SignalHandler = NullHandler> {
    config: GraphConfig,
    engines: Vec<ChanEngine>,
    /// One per level; `None` for the base level.
    aggregators: Vec<Option<BarAggregator>>,
    handler: H,
    halted: bool,
}

impl ChanGraph<NullHandler> {
    pub fn new(config: GraphConfig) -> Result<Self, ChanError> {
        Self::with_handler(config, NullHandler)
    }
}

impl<H: SignalHandler> ChanGraph<H> {
    pub fn with_handler(config: GraphConfig, handler: H) -> Result<Self, ChanError> {
        validate(&config)?;
        let last = config.levels.len() - 1;
        let mut engines = Vec::with_capacity(config.levels.len());
        let mut aggregators = Vec::with_capacity(config.levels.len());
        for (i, level) in config.levels.iter().enumerate() {
            let mut engine = ChanEngine::new(
                &config.symbol,
                &config.exchange,
                level.frequency,
                level.engine.clone(),
            );
            if i == 0 && last > 0 {
                engine = engine.with_resonance_partner();
            }
            engines.push(engine);
            aggregators.push((i != last).then(|| BarAggregator::new(level.aggregator())));
        }
        log::info!(
            "[{}] graph over {}",
            config.symbol,
            config
                .levels
                .iter()
                .map(|l| l.frequency.label())
                .collect::<Vec<_>>()
                .join(" > ")
        );
        Ok(Self {
            config,
            engines,
            aggregators,
            handler,
            halted: false,
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn base_frequency(&self) -> Frequency {
        self.config.levels[self.config.levels.len() - 1].frequency
    }

    /// Engines, coarsest first.
    pub fn engines(&self) -> &[ChanEngine] {
        &self.engines
    }

    pub fn engine(&self, frequency: Frequency) -> Option<&ChanEngine> {
        self.engines.iter().find(|e| e.frequency() == frequency)
    }

    pub fn snapshot(&self, frequency: Frequency) -> Result<EngineSnapshot, ChanError> {
        self.engine(frequency)
            .map(ChanEngine::snapshot)
            .ok_or(ChanError::UnknownFrequency(frequency))
    }

    pub fn snapshots(&self) -> Vec<EngineSnapshot> {
        self.engines.iter().map(ChanEngine::snapshot).collect()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    pub fn is_halted(&self) -> bool {
        self.halted || self.engines.iter().any(ChanEngine::is_halted)
    }

    /// Resume every level after a sequence error.
    pub fn resync(&mut self) {
        self.halted = false;
        for engine in &mut self.engines {
            engine.resync();
        }
    }

    /// Feed one base bar through every level.
    pub fn on_bar(&mut self, bar: &Bar) -> Result<GraphUpdate, ChanError> {
        let base = self.base_frequency();
        if self.halted {
            return Err(ChanError::Halted { frequency: base });
        }
        if bar.frequency != base {
            return Err(ChanError::FrequencyMismatch {
                expected: base,
                received: bar.frequency,
            });
        }

        let mut feeds = Vec::with_capacity(self.aggregators.len());
        for aggregator in &mut self.aggregators {
            let bars = match aggregator {
                Some(aggregator) => match aggregator.update(bar) {
                    Ok(bars) => bars,
                    Err(err) => {
                        self.halted = true;
                        log::warn!("[{}] {}, halting", self.config.symbol, err);
                        return Err(err.into());
                    }
                },
                None => vec![bar.clone()],
            };
            feeds.push(bars);
        }
        self.process(feeds)
    }

    /// Complete every partly filled window at end of stream.
    pub fn finish(&mut self) -> Result<GraphUpdate, ChanError> {
        let feeds = self
            .aggregators
            .iter_mut()
            .map(|aggregator| {
                aggregator
                    .as_mut()
                    .and_then(BarAggregator::flush)
                    .into_iter()
                    .collect()
            })
            .collect();
        self.process(feeds)
    }

    fn process(&mut self, feeds: Vec<Vec<Bar>>) -> Result<GraphUpdate, ChanError> {
        let mut update = GraphUpdate::default();
        for (i, bars) in feeds.into_iter().enumerate() {
            let (left, finer) = self.engines.split_at_mut(i + 1);
            let engine = &mut left[i];
            for bar in &bars {
                let result = engine.on_bar_with(bar, finer, &mut self.handler)?;
                update.levels.push((engine.frequency(), result));
            }
        }
        Ok(update)
    }
}

fn validate(config: &GraphConfig) -> Result<(), ChanError> {
    if config.levels.is_empty() {
        return Err(ChanError::EmptyChain);
    }
    for pair in config.levels.windows(2) {
        let (coarse, fine) = (pair[0].frequency, pair[1].frequency);
        if coarse.seconds() <= fine.seconds() {
            return Err(ChanError::InvalidChain(format!(
                "{} must be coarser than {}",
                coarse, fine
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{EngineView, RecordingHandler};
    use crate::types::LevelConfig;
    use chan_core::{Candle, Timestamp};

    fn make_bar(timestamp: Timestamp, price: f32) -> Bar {
        Bar::new(
            "IF888",
            "CFFEX",
            Frequency::Min1,
            Candle::new(timestamp, price, price + 1.0, price - 1.0, price, 10.0),
        )
    }

    fn two_level() -> GraphConfig {
        GraphConfig::new(
            "IF888",
            "CFFEX",
            vec![
                LevelConfig::new(Frequency::Min5, 5),
                LevelConfig::base(Frequency::Min1),
            ],
        )
    }

    #[test]
    fn test_rejects_empty_and_unordered_chains() {
        let empty = GraphConfig::new("IF888", "CFFEX", Vec::new());
        assert_eq!(ChanGraph::new(empty).unwrap_err(), ChanError::EmptyChain);

        let unordered = GraphConfig::new(
            "IF888",
            "CFFEX",
            vec![
                LevelConfig::new(Frequency::Min1, 5),
                LevelConfig::base(Frequency::Min5),
            ],
        );
        assert!(matches!(
            ChanGraph::new(unordered),
            Err(ChanError::InvalidChain(_))
        ));
    }

    #[test]
    fn test_base_bars_aggregate_into_coarse_level() {
        let mut graph = ChanGraph::new(two_level()).unwrap();
        let mut coarse = 0;
        for i in 0..12 {
            let update = graph.on_bar(&make_bar(i * 60, 100.0 + i as f32)).unwrap();
            coarse += update.for_frequency(Frequency::Min5).count();
            assert_eq!(update.for_frequency(Frequency::Min1).count(), 1);
        }
        assert_eq!(coarse, 2);

        let tail = graph.finish().unwrap();
        assert_eq!(tail.levels.len(), 1);
        assert_eq!(tail.levels[0].0, Frequency::Min5);

        let min5 = graph.engine(Frequency::Min5).unwrap();
        assert_eq!(min5.bar_count(), 3);
        assert_eq!(min5.last_bar().unwrap().timestamp, 600);
        assert_eq!(graph.engine(Frequency::Min1).unwrap().bar_count(), 12);
    }

    #[test]
    fn test_wrong_base_frequency() {
        let mut graph = ChanGraph::new(two_level()).unwrap();
        let mut bar = make_bar(0, 100.0);
        bar.frequency = Frequency::Min5;
        assert!(matches!(
            graph.on_bar(&bar),
            Err(ChanError::FrequencyMismatch {
                expected: Frequency::Min1,
                ..
            })
        ));
    }

    #[test]
    fn test_out_of_order_base_bar_halts_graph() {
        let mut graph = ChanGraph::with_handler(two_level(), RecordingHandler::new()).unwrap();
        graph.on_bar(&make_bar(120, 100.0)).unwrap();
        assert!(matches!(
            graph.on_bar(&make_bar(60, 100.0)),
            Err(ChanError::Sequence(_))
        ));
        assert!(graph.is_halted());
        assert!(matches!(
            graph.on_bar(&make_bar(180, 100.0)),
            Err(ChanError::Halted { .. })
        ));

        graph.resync();
        assert!(graph.on_bar(&make_bar(180, 100.0)).is_ok());
        assert!(graph.into_handler().events.is_empty());
    }

    #[test]
    fn test_snapshots_per_level() {
        let mut graph = ChanGraph::new(two_level()).unwrap();
        for i in 0..5 {
            graph.on_bar(&make_bar(i * 60, 100.0)).unwrap();
        }
        assert_eq!(graph.snapshots().len(), 2);
        assert_eq!(graph.snapshot(Frequency::Min5).unwrap().candles.len(), 1);
        assert_eq!(
            graph.snapshot(Frequency::Day1),
            Err(ChanError::UnknownFrequency(Frequency::Day1))
        );
        assert_eq!(graph.engines()[0].label(), "IF888 5m");
    }
}
