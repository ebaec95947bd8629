//! Mapping from file configuration to engine configuration.

use anyhow::{anyhow, Result};
use chan_config::{BoundarySetting, Config, EngineSettings, LevelSettings};
use chan_core::{Frequency, WindowBoundary};
use chan_indicators::MacdConfig;
use chan_ta::{EngineConfig, GraphConfig, LevelConfig};

/// Engine config for one frequency.
pub fn engine_config(settings: &EngineSettings) -> EngineConfig {
    EngineConfig {
        include_containment: settings.include_containment,
        build_pivot_from_segments: settings.build_pivot_from_segments,
        use_nested_interval: settings.use_nested_interval,
        use_resonance: settings.use_resonance,
        resonance_max_delay: settings.resonance_max_delay,
        third_type_lookback: settings.third_type_lookback,
        volume_hint: settings.volume_hint,
        macd: MacdConfig::new(settings.macd_fast, settings.macd_slow, settings.macd_signal),
    }
}

fn boundary(level: &LevelSettings) -> WindowBoundary {
    match level.boundary {
        BoundarySetting::None => WindowBoundary::None,
        BoundarySetting::Interval => WindowBoundary::Interval,
        BoundarySetting::TradingDay => WindowBoundary::TradingDay {
            utc_offset: level.utc_offset_hours * 3600,
        },
    }
}

/// The graph for one symbol. The last configured level becomes the base.
pub fn graph_config(config: &Config, symbol: &str) -> Result<GraphConfig> {
    let last = config.chain.levels.len().saturating_sub(1);
    let levels = config
        .chain
        .levels
        .iter()
        .enumerate()
        .map(|(i, level)| {
            let frequency = Frequency::from_label(&level.frequency)
                .ok_or_else(|| anyhow!("unknown frequency `{}`", level.frequency))?;
            let engine = engine_config(&config.engine_for_frequency(&level.frequency));
            let level_config = if i == last {
                LevelConfig::base(frequency)
            } else {
                LevelConfig::new(frequency, level.window).with_boundary(boundary(level))
            };
            Ok(level_config.with_engine(engine))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(GraphConfig::new(symbol, &config.general.exchange, levels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_default_chain() {
        let config = Config::default();
        let graph = graph_config(&config, "IF888").unwrap();
        assert_eq!(graph, GraphConfig::default_chain("IF888", "CFFEX"));
    }

    #[test]
    fn test_overrides_reach_their_level() {
        let config = Config::parse(
            r#"
[engine]
macd_fast = 5

[frequencies.5m]
use_resonance = true

[[chain.levels]]
frequency = "5m"
window = 5

[[chain.levels]]
frequency = "1m"
"#,
        )
        .unwrap();
        let graph = graph_config(&config, "rb888").unwrap();
        assert_eq!(graph.levels.len(), 2);
        assert!(graph.levels[0].engine.use_resonance);
        assert!(!graph.levels[1].engine.use_resonance);
        assert_eq!(graph.levels[1].engine.macd.fast_period, 5);
        assert_eq!(graph.levels[1].window, 1);
    }
}
