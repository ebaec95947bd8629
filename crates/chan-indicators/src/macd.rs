//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! [`Macd`] computes a whole series at once. [`MacdStream`] produces the same
//! values one candle at a time and can rewrite its newest input, which is what
//! a merged-candle sequence does while a containment run is open.

use chan_core::Candle;

use crate::indicator::PriceSource;

/// MACD indicator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdConfig {
    /// Fast EMA period (default: 12).
    pub fast_period: usize,
    /// Slow EMA period (default: 26).
    pub slow_period: usize,
    /// Signal line EMA period (default: 9).
    pub signal_period: usize,
    /// Price source for calculation.
    pub price_source: PriceSource,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            price_source: PriceSource::Close,
        }
    }
}

impl MacdConfig {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            signal_period,
            price_source: PriceSource::Close,
        }
    }

    /// Index of the first candle with a histogram value.
    pub fn histogram_start(&self) -> usize {
        (self.slow_period + self.signal_period).saturating_sub(2)
    }

    /// Minimum number of candles before the histogram produces a value.
    pub fn min_periods(&self) -> usize {
        self.histogram_start() + 1
    }
}

/// MACD output aligned with the input candles. Indices before an
/// indicator's warm-up hold `None`.
#[derive(Debug, Clone, Default)]
pub struct MacdOutput {
    /// MACD line values (fast EMA - slow EMA).
    pub macd_line: Vec<Option<f64>>,
    /// Signal line values (EMA of MACD line).
    pub signal_line: Vec<Option<f64>>,
    /// Histogram values (MACD - Signal).
    pub histogram: Vec<Option<f64>>,
}

/// Batch MACD calculator.
pub struct Macd {
    config: MacdConfig,
}

impl Macd {
    pub fn new(config: MacdConfig) -> Self {
        Self { config }
    }

    /// Calculate MACD values for every candle.
    pub fn calculate_macd(&self, candles: &[Candle]) -> MacdOutput {
        let prices: Vec<f64> = candles
            .iter()
            .map(|c| self.config.price_source.extract(c))
            .collect();
        let len = prices.len();

        let mut output = MacdOutput {
            macd_line: vec![None; len],
            signal_line: vec![None; len],
            histogram: vec![None; len],
        };
        let (fast, slow, signal) = (
            self.config.fast_period,
            self.config.slow_period,
            self.config.signal_period,
        );
        if fast == 0 || slow == 0 || signal == 0 || len < slow || len < fast {
            return output;
        }

        let fast_ema = calculate_ema(&prices, fast);
        let slow_ema = calculate_ema(&prices, slow);

        // The MACD line starts where both EMAs exist
        let macd_start = slow.max(fast) - 1;
        let mut macd_values = Vec::with_capacity(len - macd_start);
        for i in macd_start..len {
            let value = fast_ema[i + 1 - fast] - slow_ema[i + 1 - slow];
            output.macd_line[i] = Some(value);
            macd_values.push(value);
        }

        let signal_ema = calculate_ema(&macd_values, signal);
        let signal_start = macd_start + signal - 1;
        for (offset, value) in signal_ema.iter().enumerate() {
            let i = signal_start + offset;
            output.signal_line[i] = Some(*value);
            output.histogram[i] = Some(macd_values[i - macd_start] - value);
        }

        output
    }

    pub fn config(&self) -> &MacdConfig {
        &self.config
    }

    pub fn min_periods(&self) -> usize {
        self.config.min_periods()
    }
}

fn multiplier(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Calculate Exponential Moving Average, seeded with the SMA of the first
/// `period` values.
fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.len() < period || period == 0 {
        return Vec::new();
    }

    let k = multiplier(period);
    let mut ema_values = Vec::with_capacity(prices.len() - period + 1);
    let first_sma: f64 = prices[..period].iter().sum::<f64>() / period as f64;
    ema_values.push(first_sma);

    let mut prev = first_sma;
    for price in &prices[period..] {
        prev = (price - prev) * k + prev;
        ema_values.push(prev);
    }

    ema_values
}

/// One EMA step. `count` is the number of inputs seen including `value`.
fn ema_step(
    count: usize,
    period: usize,
    prev: Option<f64>,
    value: f64,
    seed: impl FnOnce() -> f64,
) -> Option<f64> {
    if period == 0 || count < period {
        None
    } else if count == period {
        Some(seed())
    } else {
        prev.map(|p| (value - p) * multiplier(period) + p)
    }
}

/// Incremental MACD over a candle sequence whose newest element may change.
#[derive(Debug, Clone)]
pub struct MacdStream {
    config: MacdConfig,
    prices: Vec<f64>,
    fast: Vec<Option<f64>>,
    slow: Vec<Option<f64>>,
    dif: Vec<Option<f64>>,
    dea: Vec<Option<f64>>,
}

impl MacdStream {
    pub fn new(config: MacdConfig) -> Self {
        Self {
            config,
            prices: Vec::new(),
            fast: Vec::new(),
            slow: Vec::new(),
            dif: Vec::new(),
            dea: Vec::new(),
        }
    }

    pub fn config(&self) -> &MacdConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Index of the first candle that can carry a histogram value.
    pub fn first_valid_index(&self) -> usize {
        self.config.histogram_start()
    }

    /// Append the price of a new newest candle.
    pub fn push(&mut self, price: f64) {
        let count = self.prices.len() + 1;
        self.prices.push(price);

        let prices = &self.prices;
        let fast_period = self.config.fast_period;
        let slow_period = self.config.slow_period;
        let fast = ema_step(count, fast_period, self.fast.last().copied().flatten(), price, || {
            prices[count - fast_period..].iter().sum::<f64>() / fast_period as f64
        });
        let slow = ema_step(count, slow_period, self.slow.last().copied().flatten(), price, || {
            prices[count - slow_period..].iter().sum::<f64>() / slow_period as f64
        });
        let dif = match (fast, slow) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        };

        let dea = dif.and_then(|value| {
            let signal_period = self.config.signal_period;
            let dif_count = self.dif.iter().filter(|d| d.is_some()).count() + 1;
            let difs = &self.dif;
            ema_step(dif_count, signal_period, self.dea.last().copied().flatten(), value, || {
                let earlier: f64 = difs[difs.len() + 1 - signal_period..]
                    .iter()
                    .flatten()
                    .sum();
                (earlier + value) / signal_period as f64
            })
        });

        self.fast.push(fast);
        self.slow.push(slow);
        self.dif.push(dif);
        self.dea.push(dea);
    }

    /// Rewrite the newest candle's price.
    pub fn replace_last(&mut self, price: f64) {
        self.pop();
        self.push(price);
    }

    /// Drop the newest candle.
    pub fn pop(&mut self) {
        self.prices.pop();
        self.fast.pop();
        self.slow.pop();
        self.dif.pop();
        self.dea.pop();
    }

    /// Bring the stream in line with `candles` after their newest element
    /// was appended, replaced, or removed and re-applied.
    pub fn follow(&mut self, candles: &[Candle]) {
        while self.len() > candles.len() {
            self.pop();
        }
        let Some(newest) = candles.last() else {
            return;
        };
        let price = self.config.price_source.extract(newest);
        if self.len() == candles.len() {
            self.replace_last(price);
        } else {
            while self.len() + 1 < candles.len() {
                let missing = self.config.price_source.extract(&candles[self.len()]);
                self.push(missing);
            }
            self.push(price);
        }
    }

    /// MACD line at `index`.
    pub fn macd_line(&self, index: usize) -> Option<f64> {
        self.dif.get(index).copied().flatten()
    }

    /// Signal line at `index`.
    pub fn signal_line(&self, index: usize) -> Option<f64> {
        self.dea.get(index).copied().flatten()
    }

    /// Histogram (MACD - signal) at `index`.
    pub fn histogram(&self, index: usize) -> Option<f64> {
        match (self.macd_line(index), self.signal_line(index)) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candles(closes: &[f32]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: i as i64 * 60,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0,
            })
            .collect()
    }

    fn wavy_closes(count: usize) -> Vec<f32> {
        (0..count)
            .map(|i| 100.0 + (i as f32 * 0.3).sin() * 5.0 + i as f32 * 0.05)
            .collect()
    }

    #[test]
    fn test_ema_calculation() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let ema = calculate_ema(&prices, 3);

        assert_eq!(ema.len(), 8); // 10 - 3 + 1 = 8
        assert!((ema[0] - 2.0).abs() < 1e-9); // First value is SMA of [1,2,3] = 2.0
    }

    #[test]
    fn test_macd_basic() {
        let closes: Vec<f32> = (1..=50).map(|i| 100.0 + i as f32).collect();
        let candles = make_candles(&closes);

        let macd = Macd::new(MacdConfig::default());
        let output = macd.calculate_macd(&candles);

        // MACD line starts at index 25 (slow_period - 1)
        assert!(output.macd_line[24].is_none());
        assert!(output.macd_line[25].is_some());

        // Signal line and histogram start at index 33
        assert!(output.signal_line[32].is_none());
        assert!(output.histogram[32].is_none());
        assert!(output.signal_line[33].is_some());
        assert!(output.histogram[33].is_some());
    }

    #[test]
    fn test_macd_min_periods() {
        let macd = Macd::new(MacdConfig::default());
        assert_eq!(macd.min_periods(), 34); // 26 + 9 - 1
        assert_eq!(macd.config().histogram_start(), 33);
    }

    #[test]
    fn test_stream_matches_batch() {
        let candles = make_candles(&wavy_closes(120));
        let batch = Macd::new(MacdConfig::default()).calculate_macd(&candles);

        let mut stream = MacdStream::new(MacdConfig::default());
        for (i, candle) in candles.iter().enumerate() {
            stream.push(candle.close as f64);
            match (stream.histogram(i), batch.histogram[i]) {
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-9, "index {i}"),
                (None, None) => {}
                other => panic!("mismatch at {i}: {other:?}"),
            }
        }
        assert_eq!(stream.first_valid_index(), 33);
    }

    #[test]
    fn test_stream_replace_last_matches_rewritten_series() {
        let mut closes = wavy_closes(60);
        let mut stream = MacdStream::new(MacdConfig::default());
        for close in &closes {
            stream.push(*close as f64);
        }

        closes[59] = 120.0;
        stream.replace_last(120.0);

        let batch = Macd::new(MacdConfig::default()).calculate_macd(&make_candles(&closes));
        let a = stream.histogram(59).unwrap();
        let b = batch.histogram[59].unwrap();
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_follow_tracks_shrinking_sequence() {
        let closes = wavy_closes(40);
        let mut candles = make_candles(&closes);
        let mut stream = MacdStream::new(MacdConfig::default());
        for i in 1..=candles.len() {
            stream.follow(&candles[..i]);
        }
        assert_eq!(stream.len(), 40);

        // Newest candle removed and folded into the one before it.
        candles.pop();
        candles[38].close = 90.0;
        stream.follow(&candles);
        assert_eq!(stream.len(), 39);

        let batch = Macd::new(MacdConfig::default()).calculate_macd(&candles);
        let a = stream.histogram(38).unwrap();
        let b = batch.histogram[38].unwrap();
        assert!((a - b).abs() < 1e-9);
    }
}
