//! Incremental aggregation of base bars into coarser windows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::candle::{Bar, Timestamp};
use crate::error::SequenceError;
use crate::frequency::Frequency;

const SECONDS_PER_DAY: Timestamp = 86_400;

/// Rule deciding when a partially filled window must close early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowBoundary {
    /// Windows close on bar count only.
    None,
    /// Windows never straddle a clock-aligned bucket of the target frequency.
    Interval,
    /// Windows never straddle a trading day. The offset shifts UTC to the
    /// session's calendar day.
    TradingDay { utc_offset: Timestamp },
}

/// Configuration for a [`BarAggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Number of base bars in a full window.
    pub window: usize,
    /// Frequency stamped on completed window bars.
    pub target: Frequency,
    pub boundary: WindowBoundary,
}

impl AggregatorConfig {
    /// Create a config with clock-aligned window boundaries.
    pub fn new(window: usize, target: Frequency) -> Self {
        Self {
            window: window.max(1),
            target,
            boundary: WindowBoundary::Interval,
        }
    }

    pub fn with_boundary(mut self, boundary: WindowBoundary) -> Self {
        self.boundary = boundary;
        self
    }
}

type WindowCallback = Box<dyn FnMut(&Bar) + Send>;

/// Buffers base bars and emits a coarser bar per completed window.
///
/// A window completes once `window` bars have accumulated, or early when the
/// next bar falls outside the boundary of the buffered ones. The window bar
/// carries the timestamp of its first base bar.
pub struct BarAggregator {
    config: AggregatorConfig,
    buffer: Vec<Bar>,
    last_timestamp: Option<Timestamp>,
    on_window_bar: Option<WindowCallback>,
}

impl BarAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            buffer: Vec::with_capacity(config.window),
            last_timestamp: None,
            on_window_bar: None,
        }
    }

    /// Register a callback invoked with each completed window bar before
    /// `update` returns.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Bar) + Send + 'static,
    {
        self.on_window_bar = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Number of base bars waiting in the open window.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one base bar. Returns completed window bars, oldest first.
    ///
    /// A bar repeating the last timestamp replaces the buffered bar; if that
    /// window has already been emitted the repeat is dropped.
    pub fn update(&mut self, bar: &Bar) -> Result<Vec<Bar>, SequenceError> {
        if let Some(last) = self.last_timestamp {
            if bar.timestamp < last {
                return Err(SequenceError {
                    frequency: bar.frequency,
                    last,
                    received: bar.timestamp,
                });
            }
            if bar.timestamp == last {
                match self.buffer.last_mut() {
                    Some(slot) if slot.timestamp == bar.timestamp => *slot = bar.clone(),
                    _ => log::warn!(
                        "[{} {}] repeat of bar at {} arrived after its window closed, dropped",
                        bar.symbol,
                        self.config.target,
                        bar.timestamp
                    ),
                }
                return Ok(Vec::new());
            }
        }
        self.last_timestamp = Some(bar.timestamp);

        let mut completed = Vec::new();
        let crosses = self
            .buffer
            .first()
            .map(|first| self.bucket(first.timestamp) != self.bucket(bar.timestamp))
            .unwrap_or(false);
        if crosses {
            completed.extend(self.complete());
        }

        self.buffer.push(bar.clone());
        if self.buffer.len() >= self.config.window {
            completed.extend(self.complete());
        }

        Ok(completed)
    }

    /// Complete the open window at end of stream, if any bars are buffered.
    pub fn flush(&mut self) -> Option<Bar> {
        self.complete()
    }

    fn bucket(&self, timestamp: Timestamp) -> Option<Timestamp> {
        match self.config.boundary {
            WindowBoundary::None => None,
            WindowBoundary::Interval => Some(timestamp.div_euclid(self.config.target.seconds())),
            WindowBoundary::TradingDay { utc_offset } => {
                Some((timestamp + utc_offset).div_euclid(SECONDS_PER_DAY))
            }
        }
    }

    fn complete(&mut self) -> Option<Bar> {
        let first = self.buffer.first()?;
        let mut window = first.clone();
        window.frequency = self.config.target;
        for bar in &self.buffer[1..] {
            window.high = window.high.max(bar.high);
            window.low = window.low.min(bar.low);
            window.close = bar.close;
            window.volume += bar.volume;
        }
        self.buffer.clear();

        if let Some(callback) = self.on_window_bar.as_mut() {
            callback(&window);
        }
        Some(window)
    }
}

impl fmt::Debug for BarAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarAggregator")
            .field("config", &self.config)
            .field("pending", &self.buffer.len())
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::candle::Candle;
    use crate::frequency::aggregate_candles;

    fn make_bar(time: Timestamp, base: f32) -> Bar {
        Bar::new(
            "rb2310",
            "SHFE",
            Frequency::Min1,
            Candle::new(time, base, base + 2.0, base - 1.0, base + 1.0, 10.0),
        )
    }

    #[test]
    fn test_completes_on_window_count() {
        let mut agg = BarAggregator::new(AggregatorConfig::new(5, Frequency::Min5));
        let mut out = Vec::new();
        for i in 0..10 {
            out.extend(agg.update(&make_bar(i * 60, 100.0 + i as f32)).unwrap());
        }

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, 0);
        assert_eq!(out[0].frequency, Frequency::Min5);
        assert_eq!(out[0].open, 100.0);
        assert_eq!(out[0].close, 105.0);
        assert_eq!(out[0].high, 106.0);
        assert_eq!(out[0].low, 99.0);
        assert_eq!(out[0].volume, 50.0);
        assert_eq!(out[1].timestamp, 300);
        assert_eq!(agg.pending(), 0);
    }

    #[test]
    fn test_interval_windows_match_batch_aggregation() {
        // Gaps inside windows, but every bucket's first minute is present.
        let minutes: Vec<Timestamp> = (0..24).filter(|m| ![7, 8, 13].contains(m)).collect();
        let bars: Vec<Bar> = minutes
            .iter()
            .map(|&m| make_bar(m * 60, 100.0 + (m % 7) as f32))
            .collect();

        let mut agg = BarAggregator::new(AggregatorConfig::new(5, Frequency::Min5));
        let mut out = Vec::new();
        for bar in &bars {
            out.extend(agg.update(bar).unwrap());
        }
        out.extend(agg.flush());

        let candles: Vec<Candle> = bars.iter().map(Bar::candle).collect();
        let expected = aggregate_candles(&candles, Frequency::Min5);
        let windows: Vec<Candle> = out.iter().map(Bar::candle).collect();
        assert_eq!(windows.len(), 5);
        assert_eq!(windows, expected);
    }

    #[test]
    fn test_boundary_crossing_forces_early_completion() {
        let mut agg = BarAggregator::new(AggregatorConfig::new(5, Frequency::Min5));
        // Three bars of the first bucket, then a gap into the next one.
        for i in 0..3 {
            assert!(agg.update(&make_bar(i * 60, 100.0)).unwrap().is_empty());
        }
        let out = agg.update(&make_bar(360, 101.0)).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp, 0);
        assert_eq!(out[0].volume, 30.0);
        assert_eq!(agg.pending(), 1);
    }

    #[test]
    fn test_trading_day_boundary() {
        let config = AggregatorConfig::new(240, Frequency::Day1)
            .with_boundary(WindowBoundary::TradingDay { utc_offset: 8 * 3600 });
        let mut agg = BarAggregator::new(config);

        // 15:59 and 16:00 UTC straddle midnight at UTC+8.
        assert!(agg.update(&make_bar(15 * 3600 + 59 * 60, 100.0)).unwrap().is_empty());
        let out = agg.update(&make_bar(16 * 3600, 100.0)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frequency, Frequency::Day1);
    }

    #[test]
    fn test_rejects_out_of_order() {
        let mut agg = BarAggregator::new(AggregatorConfig::new(5, Frequency::Min5));
        agg.update(&make_bar(120, 100.0)).unwrap();
        let err = agg.update(&make_bar(60, 100.0)).unwrap_err();
        assert_eq!(err.last, 120);
        assert_eq!(err.received, 60);
    }

    #[test]
    fn test_repeat_timestamp_replaces_buffered_bar() {
        let mut agg = BarAggregator::new(AggregatorConfig::new(2, Frequency::Min5));
        agg.update(&make_bar(0, 100.0)).unwrap();
        agg.update(&make_bar(0, 110.0)).unwrap();
        let out = agg.update(&make_bar(60, 100.0)).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].open, 110.0);
        assert_eq!(out[0].volume, 20.0);
    }

    #[test]
    fn test_repeat_after_window_closed_is_dropped() {
        let mut agg = BarAggregator::new(AggregatorConfig::new(2, Frequency::Min5));
        agg.update(&make_bar(0, 100.0)).unwrap();
        let out = agg.update(&make_bar(60, 100.0)).unwrap();
        assert_eq!(out[0].close, 101.0);

        assert!(agg.update(&make_bar(60, 120.0)).unwrap().is_empty());
        assert_eq!(agg.pending(), 0);
        let out = agg.update(&make_bar(120, 100.0)).unwrap();
        assert!(out.is_empty());
        assert_eq!(agg.flush().map(|bar| bar.timestamp), Some(120));
    }

    #[test]
    fn test_callback_and_flush() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut agg = BarAggregator::new(
            AggregatorConfig::new(30, Frequency::Min30).with_boundary(WindowBoundary::None),
        )
        .with_callback(move |bar| sink.lock().unwrap().push(bar.timestamp));

        for i in 0..35 {
            agg.update(&make_bar(i * 60, 100.0)).unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), vec![0]);

        let tail = agg.flush().unwrap();
        assert_eq!(tail.timestamp, 30 * 60);
        assert_eq!(*seen.lock().unwrap(), vec![0, 30 * 60]);
        assert!(agg.flush().is_none());
    }
}
