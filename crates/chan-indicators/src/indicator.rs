//! Shared indicator types.

use chan_core::Candle;

/// Which price to use for indicator calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceSource {
    Open,
    High,
    Low,
    #[default]
    Close,
    /// (High + Low) / 2
    HL2,
    /// (High + Low + Close) / 3
    HLC3,
}

impl PriceSource {
    /// Extract the price from a candle based on this source.
    pub fn extract(&self, candle: &Candle) -> f64 {
        let (o, h, l, c) = (
            candle.open as f64,
            candle.high as f64,
            candle.low as f64,
            candle.close as f64,
        );
        match self {
            PriceSource::Open => o,
            PriceSource::High => h,
            PriceSource::Low => l,
            PriceSource::Close => c,
            PriceSource::HL2 => (h + l) / 2.0,
            PriceSource::HLC3 => (h + l + c) / 3.0,
        }
    }
}
