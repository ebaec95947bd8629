//! Sanity checks for loaded bars.

use chan_core::Bar;

/// Validate a bar has reasonable values.
pub fn validate_bar(bar: &Bar) -> bool {
    bar.open.is_finite()
        && bar.high.is_finite()
        && bar.low.is_finite()
        && bar.close.is_finite()
        && bar.volume.is_finite()
        && bar.high >= bar.low
        && bar.high >= bar.open.max(bar.close)
        && bar.low <= bar.open.min(bar.close)
        && bar.volume >= 0.0
}
