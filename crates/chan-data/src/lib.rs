//! Data loading utilities for chan.

pub mod csv;
pub mod source;
pub mod validation;

pub use self::csv::{load_bars_from_csv, load_bars_from_reader, parse_datetime, CsvLoader};
pub use source::DataSource;
pub use validation::validate_bar;
