//! CSV data loading implementation.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chan_core::{Bar, Candle, Frequency, Timestamp};

use crate::validation::validate_bar;
use crate::DataSource;

/// Loads one symbol's base bars from a CSV file.
pub struct CsvLoader {
    path: PathBuf,
    symbol: String,
    exchange: String,
    frequency: Frequency,
}

impl CsvLoader {
    pub fn new<P: AsRef<Path>>(path: P, symbol: &str, exchange: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            frequency: Frequency::Min1,
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }
}

impl DataSource for CsvLoader {
    fn load(&self) -> anyhow::Result<Vec<Bar>> {
        load_bars_from_csv(&self.path, &self.symbol, &self.exchange, self.frequency)
    }
}

/// Parse datetime string "YYYY-MM-DD HH:MM:SS" or Unix timestamp to unix timestamp.
/// Millisecond timestamps (13+ digits) are scaled down to seconds.
pub fn parse_datetime(s: &str) -> Option<Timestamp> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<f64>() {
        let ts = if ts > 1e12 { ts / 1000.0 } else { ts };
        return Some(ts as Timestamp);
    }

    // Format: "2017-08-17 04:00:00"
    let parts: Vec<&str> = s.split(&['-', ' ', ':', 'T']).collect();
    if parts.len() < 6 {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let day: u32 = parts[2].parse().ok()?;
    let hour: u32 = parts[3].parse().ok()?;
    let min: u32 = parts[4].parse().ok()?;
    let sec: u32 = parts[5].parse().ok()?;
    if !(1..=12).contains(&month) || day == 0 {
        return None;
    }

    // Days since Unix epoch (1970-01-01), ignoring leap seconds
    let is_leap = |y: i32| y % 4 == 0 && (y % 100 != 0 || y % 400 == 0);
    let mut days: i64 = (1970..year).map(|y| if is_leap(y) { 366 } else { 365 }).sum();
    let month_days = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
    days += month_days[month as usize - 1];
    if month > 2 && is_leap(year) {
        days += 1;
    }
    days += (day - 1) as i64;

    Some(days * 86400 + hour as i64 * 3600 + min as i64 * 60 + sec as i64)
}

/// Load base bars from a CSV file. See [`load_bars_from_reader`].
pub fn load_bars_from_csv<P: AsRef<Path>>(
    path: P,
    symbol: &str,
    exchange: &str,
    frequency: Frequency,
) -> anyhow::Result<Vec<Bar>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    load_bars_from_reader(file, symbol, exchange, frequency)
        .with_context(|| format!("failed to load bars from {}", path.display()))
}

/// Load base bars from CSV text with a header row.
///
/// Columns are found by header name (`timestamp`/`datetime`/`time`, `open`,
/// `high`, `low`, `close`, `volume`), falling back to that order. Rows that
/// fail validation are skipped. Bars are returned sorted by timestamp with
/// later duplicates of a timestamp kept in file order.
pub fn load_bars_from_reader<R: io::Read>(
    reader: R,
    symbol: &str,
    exchange: &str,
    frequency: Frequency,
) -> anyhow::Result<Vec<Bar>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let headers_lower: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let column = |names: &[&str], fallback: usize| {
        headers_lower
            .iter()
            .position(|h| names.iter().any(|n| h == n))
            .unwrap_or(fallback)
    };

    let ts_col = column(&["timestamp", "datetime", "time", "date"], 0);
    let open_col = column(&["open"], 1);
    let high_col = column(&["high"], 2);
    let low_col = column(&["low"], 3);
    let close_col = column(&["close"], 4);
    let volume_col = column(&["volume", "vol"], 5);

    let mut bars = Vec::new();
    let mut skipped = 0usize;
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let field = |col: usize| record.get(col).unwrap_or("");

        let timestamp = parse_datetime(field(ts_col))
            .with_context(|| format!("row {}: bad timestamp `{}`", row + 1, field(ts_col)))?;
        let price = |col: usize| -> anyhow::Result<f32> {
            field(col)
                .parse()
                .with_context(|| format!("row {}: bad number `{}`", row + 1, field(col)))
        };
        let volume = if field(volume_col).is_empty() {
            0.0
        } else {
            price(volume_col)?
        };
        let candle = Candle::new(
            timestamp,
            price(open_col)?,
            price(high_col)?,
            price(low_col)?,
            price(close_col)?,
            volume,
        );

        let bar = Bar::new(symbol, exchange, frequency, candle);
        if validate_bar(&bar) {
            bars.push(bar);
        } else {
            skipped += 1;
        }
    }
    if skipped > 0 {
        log::warn!("[{} {}] skipped {} invalid rows", symbol, frequency, skipped);
    }

    bars.sort_by_key(|bar| bar.timestamp);
    let timestamps: Vec<Timestamp> = bars.iter().map(|b| b.timestamp).collect();
    analyze_data_gaps(symbol, &timestamps);

    Ok(bars)
}

/// Summary of gaps in a timestamp series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GapReport {
    /// Most common spacing between consecutive timestamps.
    pub expected_interval: Timestamp,
    pub gaps: usize,
    pub missing: i64,
    pub largest_gap: Timestamp,
    pub largest_gap_start: Timestamp,
}

/// Analyze data for gaps and missing data points, logging a summary.
pub fn analyze_data_gaps(symbol: &str, timestamps: &[Timestamp]) -> Option<GapReport> {
    if timestamps.len() < 2 {
        return None;
    }

    let mut intervals: HashMap<Timestamp, usize> = HashMap::new();
    for window in timestamps.windows(2) {
        let diff = window[1] - window[0];
        if diff > 0 {
            *intervals.entry(diff).or_insert(0) += 1;
        }
    }
    let expected_interval = intervals
        .iter()
        .max_by_key(|(interval, count)| (**count, std::cmp::Reverse(**interval)))
        .map(|(interval, _)| *interval)
        .unwrap_or(60);

    let mut report = GapReport {
        expected_interval,
        ..GapReport::default()
    };
    for window in timestamps.windows(2) {
        let diff = window[1] - window[0];
        if diff > expected_interval {
            report.gaps += 1;
            report.missing += diff / expected_interval - 1;
            if diff > report.largest_gap {
                report.largest_gap = diff;
                report.largest_gap_start = window[0];
            }
        }
    }

    log::info!(
        "[{}] {} bars, interval {}s, {} gaps ({} missing)",
        symbol,
        timestamps.len(),
        expected_interval,
        report.gaps,
        report.missing
    );
    if report.largest_gap > 0 {
        log::debug!(
            "[{}] largest gap {}s at {}",
            symbol,
            report.largest_gap,
            report.largest_gap_start
        );
    }
    Some(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_formats() {
        assert_eq!(parse_datetime("1970-01-02 00:00:00"), Some(86400));
        assert_eq!(parse_datetime("2024-03-01 00:00:00"), Some(1709251200));
        assert_eq!(parse_datetime("1709251200"), Some(1709251200));
        assert_eq!(parse_datetime("1709251200000"), Some(1709251200));
        assert_eq!(parse_datetime("not a date"), None);
    }

    #[test]
    fn test_load_from_reader_sorts_and_skips_invalid() {
        let text = "\
datetime,open,high,low,close,volume
1970-01-01 00:02:00,10,11,9,10.5,5
1970-01-01 00:00:00,10,11,9,10.5,5
1970-01-01 00:01:00,10,9,11,10.5,5
";
        let bars = load_bars_from_reader(text.as_bytes(), "IF888", "CFFEX", Frequency::Min1).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, 0);
        assert_eq!(bars[1].timestamp, 120);
        assert_eq!(bars[0].symbol, "IF888");
        assert_eq!(bars[0].frequency, Frequency::Min1);
    }

    #[test]
    fn test_load_from_reader_by_header_names() {
        let text = "\
volume,close,low,high,open,timestamp
7,10.5,9,11,10,60000
";
        let bars = load_bars_from_reader(text.as_bytes(), "IF888", "CFFEX", Frequency::Min1).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp, 60000);
        assert_eq!(bars[0].open, 10.0);
        assert_eq!(bars[0].volume, 7.0);
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let text = "timestamp,open,high,low,close,volume\n60,abc,11,9,10,1\n";
        assert!(load_bars_from_reader(text.as_bytes(), "IF888", "CFFEX", Frequency::Min1).is_err());
    }

    #[test]
    fn test_csv_loader_reads_file_at_frequency() {
        let path = std::env::temp_dir().join(format!("chan-data-loader-{}.csv", std::process::id()));
        std::fs::write(
            &path,
            "timestamp,open,high,low,close,volume\n0,10,11,9,10.5,5\n300,10,12,9,11,6\n",
        )
        .unwrap();

        let loader = CsvLoader::new(&path, "rb888", "SHFE").with_frequency(Frequency::Min5);
        let bars = loader.load().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(bars.len(), 2);
        assert!(bars
            .iter()
            .all(|bar| bar.frequency == Frequency::Min5 && bar.exchange == "SHFE"));
        assert!(loader.load().is_err());
    }

    #[test]
    fn test_gap_report() {
        let timestamps = [0, 60, 120, 300, 360];
        let report = analyze_data_gaps("IF888", &timestamps).unwrap();
        assert_eq!(report.expected_interval, 60);
        assert_eq!(report.gaps, 1);
        assert_eq!(report.missing, 2);
        assert_eq!(report.largest_gap_start, 120);
    }
}
