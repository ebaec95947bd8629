//! Indicator framework for the chan engine.

pub mod indicator;
pub mod macd;

pub use indicator::PriceSource;
pub use macd::{Macd, MacdConfig, MacdOutput, MacdStream};
