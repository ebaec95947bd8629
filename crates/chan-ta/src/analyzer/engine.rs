//! One frequency's full pipeline, from raw bars to signals.

use chan_core::{Bar, Candle, Frequency, SequenceError, Timestamp};
use chan_indicators::MacdStream;
use serde::{Deserialize, Serialize};

use super::divergence::AreaCache;
use super::fractal::FractalDetector;
use super::merger::CandleMerger;
use super::nested;
use super::pivot::{Confirmation, PivotContext, PivotEngine, PivotUpdate};
use super::segment::SegmentBuilder;
use super::stroke::{StrokeBuilder, StrokeUpdate};
use super::{AnalysisResult, EngineView, SignalHandler};
use crate::error::ChanError;
use crate::types::{
    Checkpoint, EngineConfig, Fractal, Pivot, PivotKind, Signal, SignalSide, TrendSegment,
};

/// Owned copy of every structure list of one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub symbol: String,
    pub frequency: Frequency,
    pub candles: Vec<Candle>,
    pub fractals: Vec<Fractal>,
    pub strokes: Vec<Fractal>,
    pub segments: Vec<Fractal>,
    pub pivots: Vec<Pivot>,
    pub trends: Vec<TrendSegment>,
    pub buys: Vec<Signal>,
    pub sells: Vec<Signal>,
}

/// What the pivot engine sees of its owner while processing one bar.
struct EngineContext<'a> {
    now: Timestamp,
    finer: &'a [ChanEngine],
    nested: bool,
    partner_buys: Option<usize>,
}

impl PivotContext for EngineContext<'_> {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn resonance_partner(&self) -> Option<usize> {
        self.partner_buys
    }

    fn confirm_turn(&self, start: Timestamp, end: Timestamp, kind: PivotKind) -> Confirmation {
        if !self.nested || self.finer.is_empty() {
            return Confirmation::immediate();
        }
        nested::confirm_turn(self.finer, start, end, kind)
    }

    fn confirm_trend(&self, start: Timestamp, end: Timestamp, kind: PivotKind) -> Confirmation {
        if !self.nested || self.finer.is_empty() {
            return Confirmation::immediate();
        }
        nested::confirm_trend(self.finer, start, end, kind)
    }
}

/// Incremental analysis of one symbol on one frequency.
///
/// Bars must arrive in timestamp order. A bar repeating the last timestamp
/// replaces it: the fractals, strokes and segments the replaced bar produced
/// are undone before the new one is applied. Pivots and signals are not
/// rolled back; they settle on the next structure change. An older bar halts
/// the engine until [`resync`](Self::resync).
#[derive(Debug, Clone)]
pub struct ChanEngine {
    symbol: String,
    exchange: String,
    frequency: Frequency,
    config: EngineConfig,
    label: String,
    resonance: bool,
    halted: bool,
    last_bar: Option<Bar>,
    bar_count: usize,
    merger: CandleMerger,
    macd: MacdStream,
    fractals: FractalDetector,
    strokes: StrokeBuilder,
    segments: SegmentBuilder,
    pivots: PivotEngine,
    /// Tail of the structure list last handed to the pivot engine this bar.
    pivot_input: Option<Checkpoint<Fractal>>,
    /// The same, for the bar being replaced by a repeat.
    replaced_input: Option<Checkpoint<Fractal>>,
}

impl ChanEngine {
    pub fn new(symbol: &str, exchange: &str, frequency: Frequency, config: EngineConfig) -> Self {
        let label = format!("{} {}", symbol, frequency);
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            frequency,
            merger: CandleMerger::new(config.include_containment),
            macd: MacdStream::new(config.macd),
            fractals: FractalDetector::new(),
            strokes: StrokeBuilder::new(),
            segments: SegmentBuilder::new(),
            pivots: PivotEngine::new(label.clone(), config.third_type_lookback),
            pivot_input: None,
            replaced_input: None,
            label,
            resonance: false,
            halted: false,
            last_bar: None,
            bar_count: 0,
            config,
        }
    }

    /// Hold first-type buys until the next finer engine confirms a buy.
    /// Only honoured when the config enables resonance.
    pub fn with_resonance_partner(mut self) -> Self {
        self.resonance = self.config.use_resonance;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Raw bars accepted so far, repeats included.
    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.last_bar.as_ref()
    }

    pub fn candles(&self) -> &[Candle] {
        self.merger.candles()
    }

    pub fn macd(&self) -> &MacdStream {
        &self.macd
    }

    pub fn fractals(&self) -> &[Fractal] {
        self.fractals.fractals()
    }

    pub fn strokes(&self) -> &[Fractal] {
        self.strokes.strokes()
    }

    pub fn segments(&self) -> &[Fractal] {
        self.segments.segments()
    }

    pub fn pivots(&self) -> &[Pivot] {
        self.pivots.pivots()
    }

    pub fn trends(&self) -> &[TrendSegment] {
        self.pivots.trends()
    }

    pub fn buys(&self) -> impl Iterator<Item = &Signal> + '_ {
        self.pivots.buys()
    }

    pub fn sells(&self) -> impl Iterator<Item = &Signal> + '_ {
        self.pivots.sells()
    }

    /// Every signal created, including candidates never emitted.
    pub fn signals(&self) -> &[Signal] {
        self.pivots.signals()
    }

    /// Resume a halted stream. The next bar must still be newer than the
    /// last accepted one.
    pub fn resync(&mut self) {
        if self.halted {
            log::info!("[{}] resynced", self.label);
        }
        self.halted = false;
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            symbol: self.symbol.clone(),
            frequency: self.frequency,
            candles: self.candles().to_vec(),
            fractals: self.fractals().to_vec(),
            strokes: self.strokes().to_vec(),
            segments: self.segments().to_vec(),
            pivots: self.pivots().to_vec(),
            trends: self.trends().to_vec(),
            buys: self.buys().cloned().collect(),
            sells: self.sells().cloned().collect(),
        }
    }

    /// Process one bar with no finer frequencies to consult.
    pub fn on_bar(
        &mut self,
        bar: &Bar,
        handler: &mut dyn SignalHandler,
    ) -> Result<AnalysisResult, ChanError> {
        self.on_bar_with(bar, &[], handler)
    }

    /// Process one bar. `finer` holds the finer engines of the same symbol,
    /// nearest first; they are only read.
    pub fn on_bar_with(
        &mut self,
        bar: &Bar,
        finer: &[ChanEngine],
        handler: &mut dyn SignalHandler,
    ) -> Result<AnalysisResult, ChanError> {
        if self.halted {
            return Err(ChanError::Halted {
                frequency: self.frequency,
            });
        }
        if bar.frequency != self.frequency {
            return Err(ChanError::FrequencyMismatch {
                expected: self.frequency,
                received: bar.frequency,
            });
        }

        let repeat = match self.last_bar.as_ref().map(|last| last.timestamp) {
            Some(last) if bar.timestamp < last => {
                self.halted = true;
                log::warn!(
                    "[{}] bar at {} is older than {}, halting",
                    self.label,
                    bar.timestamp,
                    last
                );
                return Err(SequenceError {
                    frequency: self.frequency,
                    last,
                    received: bar.timestamp,
                }
                .into());
            }
            Some(last) => bar.timestamp == last,
            None => false,
        };
        self.last_bar = Some(bar.clone());
        self.bar_count += 1;
        self.replaced_input = if repeat { self.pivot_input.take() } else { None };
        self.pivot_input = None;
        let now = bar.timestamp;

        let partner_buys = if self.resonance {
            finer.first().map(|partner| partner.buy_count())
        } else {
            None
        };
        if let Some(partner) = partner_buys {
            self.pivots
                .tick_resonance(partner, now, self.config.resonance_max_delay);
        }

        let candle = bar.candle();
        let merged = if repeat {
            log::trace!("[{}] bar at {} replaces the previous one", self.label, now);
            // Restoring a merged candle rewrites the one before the newest.
            self.macd.pop();
            self.fractals.rollback();
            self.strokes.rollback();
            self.segments.rollback();
            self.merger.replace(candle)
        } else {
            self.merger.push(candle)
        };
        self.macd.follow(self.merger.candles());
        self.strokes.begin_bar();
        self.segments.begin_bar();
        if merged {
            log::trace!("[{}] contained candle merged at {}", self.label, now);
        }

        let mut result = AnalysisResult {
            merged,
            ..AnalysisResult::default()
        };
        let ctx = EngineContext {
            now,
            finer,
            nested: self.config.use_nested_interval,
            partner_buys,
        };
        for fractal in self.fractals.detect(self.merger.candles()) {
            result.fractals.push(fractal);
            self.process_fractal(fractal, &ctx, &mut result);
        }

        self.dispatch(handler, &mut result);
        Ok(result)
    }

    fn process_fractal(&mut self, fractal: Fractal, ctx: &EngineContext<'_>, result: &mut AnalysisResult) {
        let update = self
            .strokes
            .update(self.fractals.fractals(), fractal, &self.macd);
        let stroke_changed = match update {
            StrokeUpdate::Started => {
                result.strokes_changed = true;
                return;
            }
            StrokeUpdate::Unchanged => false,
            StrokeUpdate::Changed { corrected } => {
                if corrected {
                    log::debug!(
                        "[{}] stroke start corrected, {} strokes",
                        self.label,
                        self.strokes.strokes().len()
                    );
                }
                log::debug!(
                    "[{}] stroke to {:?} at {}",
                    self.label,
                    fractal.kind,
                    fractal.timestamp
                );
                true
            }
        };
        result.strokes_changed |= stroke_changed;

        let strokes = self.strokes.strokes();
        if self.segments.update(strokes, &self.macd) {
            result.segments_changed = true;
            log::debug!(
                "[{}] segments now {}",
                self.label,
                self.segments.segments().len()
            );
        }

        let input = if self.config.build_pivot_from_segments {
            (strokes.len() > 4 && !self.segments.segments().is_empty())
                .then(|| (self.segments.segments(), self.segments.areas()))
        } else {
            stroke_changed.then(|| (strokes, self.strokes.areas()))
        };
        let Some((data, areas)) = input else {
            return;
        };

        let seen = data.checkpoint();
        let replayed = self.replaced_input.as_ref() == Some(&seen);
        self.pivot_input = Some(seen);
        if replayed {
            log::trace!("[{}] repeated bar left the structure as it was", self.label);
            return;
        }
        if let PivotUpdate::Formed(index) = self.pivots.on_point(data, None, areas, ctx) {
            result.pivot_formed = Some(index);
        }
    }

    fn dispatch(&mut self, handler: &mut dyn SignalHandler, result: &mut AnalysisResult) {
        let pending = self.pivots.drain_pending();
        if pending.is_empty() {
            return;
        }
        let price = self.last_bar.as_ref().map_or(0.0, |bar| bar.close);
        for id in pending {
            let Some(signal) = self.pivots.signal(id) else {
                continue;
            };
            match signal.side() {
                SignalSide::Buy => handler.on_buy(price, self.config.volume_hint, self.frequency),
                SignalSide::Sell => handler.on_sell(price, self.config.volume_hint, self.frequency),
            }
            result.signals.push(signal.clone());
        }
    }

    fn structure_list(&self) -> &[Fractal] {
        if self.config.build_pivot_from_segments {
            self.segments.segments()
        } else {
            self.strokes.strokes()
        }
    }
}

impl EngineView for ChanEngine {
    fn label(&self) -> &str {
        &self.label
    }

    fn frequency(&self) -> Frequency {
        self.frequency
    }

    fn structure(&self) -> &[Fractal] {
        self.structure_list()
    }

    fn structure_areas(&self) -> &AreaCache {
        if self.config.build_pivot_from_segments {
            self.segments.areas()
        } else {
            self.strokes.areas()
        }
    }

    fn last_candle_time(&self) -> Option<Timestamp> {
        self.merger.last().map(|candle| candle.timestamp)
    }

    fn third_type_lookback(&self) -> usize {
        self.config.third_type_lookback
    }

    fn buy_count(&self) -> usize {
        self.pivots.buy_ids().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::RecordingHandler;

    fn make_bar(timestamp: Timestamp, high: f32, low: f32) -> Bar {
        let mid = (high + low) / 2.0;
        Bar::new(
            "IF888",
            "CFFEX",
            Frequency::Min1,
            Candle::new(timestamp, mid, high, low, mid, 10.0),
        )
    }

    fn engine() -> ChanEngine {
        ChanEngine::new("IF888", "CFFEX", Frequency::Min1, EngineConfig::default())
    }

    #[test]
    fn test_older_bar_halts_until_resync() {
        let mut engine = engine();
        let mut handler = RecordingHandler::new();
        engine.on_bar(&make_bar(120, 10.0, 9.0), &mut handler).unwrap();

        let err = engine.on_bar(&make_bar(60, 10.0, 9.0), &mut handler).unwrap_err();
        assert!(matches!(err, ChanError::Sequence(_)));
        assert!(engine.is_halted());
        assert!(matches!(
            engine.on_bar(&make_bar(180, 10.0, 9.0), &mut handler),
            Err(ChanError::Halted {
                frequency: Frequency::Min1
            })
        ));

        engine.resync();
        assert!(engine.on_bar(&make_bar(180, 10.0, 9.0), &mut handler).is_ok());
        assert_eq!(engine.bar_count(), 2);
    }

    #[test]
    fn test_frequency_mismatch_is_rejected() {
        let mut engine = engine();
        let mut bar = make_bar(60, 10.0, 9.0);
        bar.frequency = Frequency::Min5;
        let err = engine.on_bar(&bar, &mut RecordingHandler::new()).unwrap_err();
        assert!(matches!(err, ChanError::FrequencyMismatch { .. }));
        assert!(!engine.is_halted());
    }

    #[test]
    fn test_repeat_bar_replaces_previous() {
        let mut engine = engine();
        let mut handler = RecordingHandler::new();
        engine.on_bar(&make_bar(0, 10.0, 9.0), &mut handler).unwrap();
        engine.on_bar(&make_bar(60, 12.0, 11.0), &mut handler).unwrap();
        engine.on_bar(&make_bar(120, 11.5, 11.2), &mut handler).unwrap();
        assert_eq!(engine.candles().len(), 2);

        // The corrected bar is no longer contained.
        engine.on_bar(&make_bar(120, 11.0, 10.0), &mut handler).unwrap();
        assert_eq!(engine.candles().len(), 3);
        assert_eq!(engine.macd().len(), 3);
        assert_eq!(engine.fractals().len(), 1);
        assert_eq!(engine.fractals()[0].timestamp, 60);
    }

    #[test]
    fn test_repeat_bar_cancels_fractal_and_stroke() {
        let mut engine = ChanEngine::new(
            "IF888",
            "CFFEX",
            Frequency::Min1,
            EngineConfig::default().with_containment(false),
        );
        let mut handler = RecordingHandler::new();
        engine.on_bar(&make_bar(0, 10.0, 9.0), &mut handler).unwrap();
        engine.on_bar(&make_bar(60, 12.0, 11.0), &mut handler).unwrap();
        engine.on_bar(&make_bar(120, 11.0, 10.0), &mut handler).unwrap();
        assert_eq!(engine.fractals().len(), 1);
        assert_eq!(engine.strokes().len(), 1);

        let result = engine.on_bar(&make_bar(120, 13.0, 12.0), &mut handler).unwrap();
        assert!(result.fractals.is_empty());
        assert_eq!(engine.candles()[2].high, 13.0);
        assert!(engine.fractals().is_empty());
        assert!(engine.strokes().is_empty());

        // Repeating once more restores the top.
        engine.on_bar(&make_bar(120, 11.0, 10.0), &mut handler).unwrap();
        assert_eq!(engine.fractals().len(), 1);
        assert_eq!(engine.fractals()[0].timestamp, 60);
        assert_eq!(engine.strokes().len(), 1);
    }

    #[test]
    fn test_fractals_fire_on_merged_candles() {
        let mut engine = engine();
        let mut handler = RecordingHandler::new();
        let bars = [
            make_bar(0, 10.0, 9.0),
            make_bar(60, 12.0, 11.0),
            make_bar(120, 11.0, 10.0),
            make_bar(180, 9.0, 8.0),
            make_bar(240, 10.5, 9.5),
        ];
        let mut fired = Vec::new();
        for bar in &bars {
            fired.extend(engine.on_bar(bar, &mut handler).unwrap().fractals);
        }
        let kinds: Vec<_> = fired.iter().map(|f| (f.kind, f.index)).collect();
        assert_eq!(
            kinds,
            vec![
                (crate::types::FractalKind::Top, 1),
                (crate::types::FractalKind::Bottom, 3)
            ]
        );
        assert_eq!(engine.strokes().len(), 1);
        assert!(handler.events.is_empty());
    }
}
