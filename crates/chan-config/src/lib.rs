//! Configuration management for chan.
//!
//! Loads configuration from TOML files: engine defaults, per-frequency
//! overrides and the frequency chain with its aggregation windows.

use chan_core::Frequency;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Unknown frequency label: {0}")]
    UnknownFrequency(String),
    #[error("Invalid frequency chain: {0}")]
    InvalidChain(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    /// Engine parameters shared by every frequency.
    pub engine: EngineSettings,
    /// Per-frequency overrides keyed by frequency label.
    #[serde(default)]
    pub frequencies: HashMap<String, EngineOverride>,
    pub chain: ChainConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations.
    ///
    /// Searches in order:
    /// 1. `./chan.toml`
    /// 2. `~/.config/chan/chan.toml`
    ///
    /// Returns default config if no file found.
    pub fn load_default() -> Self {
        if let Ok(config) = Self::load(Self::default_path()) {
            return config;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("chan").join("chan.toml");
            if let Ok(config) = Self::load(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Save configuration to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("chan.toml")
    }

    /// Engine settings for a frequency label.
    /// Falls back to the shared block if the frequency has no override.
    pub fn engine_for_frequency(&self, frequency: &str) -> EngineSettings {
        self.frequencies
            .get(frequency)
            .map(|o| self.engine.merge(o))
            .unwrap_or_else(|| self.engine.clone())
    }

    /// Check the chain is usable: at least one level, known frequency labels,
    /// positive windows, and no frequency listed twice.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let levels = &self.chain.levels;
        if levels.is_empty() {
            return Err(ConfigError::InvalidChain("no levels configured".to_string()));
        }
        for (i, level) in levels.iter().enumerate() {
            if Frequency::from_label(&level.frequency).is_none() {
                return Err(ConfigError::UnknownFrequency(level.frequency.clone()));
            }
            if level.window == 0 {
                return Err(ConfigError::InvalidChain(format!(
                    "level `{}` has a zero window",
                    level.frequency
                )));
            }
            if levels[..i].iter().any(|l| l.frequency == level.frequency) {
                return Err(ConfigError::InvalidChain(format!(
                    "level `{}` listed twice",
                    level.frequency
                )));
            }
        }
        if let Some(label) = self
            .frequencies
            .keys()
            .find(|label| Frequency::from_label(label).is_none())
        {
            return Err(ConfigError::UnknownFrequency(label.clone()));
        }
        Ok(())
    }
}

/// General configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Symbol used when a data file does not name one.
    pub default_symbol: String,
    pub exchange: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_symbol: "IF888".to_string(),
            exchange: "CFFEX".to_string(),
        }
    }
}

/// Engine parameters (full config with all fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Merge candles whose ranges contain one another.
    pub include_containment: bool,
    /// Build pivots from segments instead of strokes.
    pub build_pivot_from_segments: bool,
    /// Confirm signals against the finer frequencies.
    pub use_nested_interval: bool,
    /// Hold first-type buys on the coarsest frequency until the next finer
    /// one confirms a buy.
    pub use_resonance: bool,
    /// Bars a held buy waits for resonance before it is dropped.
    pub resonance_max_delay: usize,
    /// How many points back the third-type re-reversal guard looks.
    pub third_type_lookback: usize,
    /// Volume passed to buy/sell callbacks.
    pub volume_hint: f32,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            include_containment: true,
            build_pivot_from_segments: false,
            use_nested_interval: true,
            use_resonance: false,
            resonance_max_delay: 12,
            third_type_lookback: 3,
            volume_hint: 100.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl EngineSettings {
    /// Merge with an override, using override values where present.
    pub fn merge(&self, o: &EngineOverride) -> Self {
        Self {
            include_containment: o.include_containment.unwrap_or(self.include_containment),
            build_pivot_from_segments: o
                .build_pivot_from_segments
                .unwrap_or(self.build_pivot_from_segments),
            use_nested_interval: o.use_nested_interval.unwrap_or(self.use_nested_interval),
            use_resonance: o.use_resonance.unwrap_or(self.use_resonance),
            resonance_max_delay: o.resonance_max_delay.unwrap_or(self.resonance_max_delay),
            third_type_lookback: o.third_type_lookback.unwrap_or(self.third_type_lookback),
            volume_hint: o.volume_hint.unwrap_or(self.volume_hint),
            macd_fast: o.macd_fast.unwrap_or(self.macd_fast),
            macd_slow: o.macd_slow.unwrap_or(self.macd_slow),
            macd_signal: o.macd_signal.unwrap_or(self.macd_signal),
        }
    }
}

/// Engine override (all fields optional for partial overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOverride {
    pub include_containment: Option<bool>,
    pub build_pivot_from_segments: Option<bool>,
    pub use_nested_interval: Option<bool>,
    pub use_resonance: Option<bool>,
    pub resonance_max_delay: Option<usize>,
    pub third_type_lookback: Option<usize>,
    pub volume_hint: Option<f32>,
    pub macd_fast: Option<usize>,
    pub macd_slow: Option<usize>,
    pub macd_signal: Option<usize>,
}

/// How a derived level's windows are closed early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySetting {
    None,
    #[default]
    Interval,
    TradingDay,
}

/// One frequency in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSettings {
    /// Frequency label, e.g. `"30m"`.
    pub frequency: String,
    /// Base bars per window. Ignored for the base level.
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub boundary: BoundarySetting,
    /// Hours east of UTC for trading-day boundaries.
    #[serde(default)]
    pub utc_offset_hours: i64,
}

fn default_window() -> usize {
    1
}

impl LevelSettings {
    pub fn new(frequency: &str, window: usize, boundary: BoundarySetting) -> Self {
        Self {
            frequency: frequency.to_string(),
            window,
            boundary,
            utc_offset_hours: 0,
        }
    }
}

/// The frequency chain, coarsest first. The last level is the base feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub levels: Vec<LevelSettings>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                LevelSettings {
                    utc_offset_hours: 8,
                    ..LevelSettings::new("1d", 240, BoundarySetting::TradingDay)
                },
                LevelSettings::new("30m", 30, BoundarySetting::Interval),
                LevelSettings::new("5m", 5, BoundarySetting::Interval),
                LevelSettings::new("1m", 1, BoundarySetting::None),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.default_symbol, "IF888");
        assert_eq!(config.engine.resonance_max_delay, 12);
        assert_eq!(config.chain.levels.len(), 4);
        assert_eq!(config.chain.levels[0].window, 240);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frequency_override() {
        let mut config = Config::default();
        config.frequencies.insert(
            "1d".to_string(),
            EngineOverride {
                use_resonance: Some(true),
                ..Default::default()
            },
        );

        assert!(config.engine_for_frequency("1d").use_resonance);
        assert!(!config.engine_for_frequency("5m").use_resonance);
        assert_eq!(config.engine_for_frequency("unknown"), config.engine);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[general]
default_symbol = "rb888"

[engine]
use_nested_interval = false
macd_slow = 30

[frequencies.5m]
build_pivot_from_segments = true

[[chain.levels]]
frequency = "5m"
window = 5

[[chain.levels]]
frequency = "1m"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.general.default_symbol, "rb888");
        assert!(!config.engine.use_nested_interval);
        assert_eq!(config.engine.macd_slow, 30);
        assert_eq!(config.engine.macd_fast, 12);

        let five = config.engine_for_frequency("5m");
        assert!(five.build_pivot_from_segments);
        assert!(!five.use_nested_interval);

        assert_eq!(config.chain.levels.len(), 2);
        assert_eq!(config.chain.levels[0].boundary, BoundarySetting::Interval);
        assert_eq!(config.chain.levels[1].window, 1);
    }

    #[test]
    fn test_rejects_bad_chain() {
        let empty = "[chain]\nlevels = []\n";
        assert!(matches!(Config::parse(empty), Err(ConfigError::InvalidChain(_))));

        let twice = r#"
[[chain.levels]]
frequency = "1m"

[[chain.levels]]
frequency = "1m"
"#;
        assert!(matches!(Config::parse(twice), Err(ConfigError::InvalidChain(_))));
    }

    #[test]
    fn test_rejects_unknown_frequency() {
        let level = "[[chain.levels]]\nfrequency = \"2m\"\n";
        assert!(matches!(
            Config::parse(level),
            Err(ConfigError::UnknownFrequency(label)) if label == "2m"
        ));

        let over = "[frequencies.7m]\nuse_resonance = true\n";
        assert!(matches!(Config::parse(over), Err(ConfigError::UnknownFrequency(_))));
    }

    #[test]
    fn test_trading_day_boundary_parses() {
        let toml = r#"
[[chain.levels]]
frequency = "1d"
window = 240
boundary = "trading_day"
utc_offset_hours = 8

[[chain.levels]]
frequency = "1m"
boundary = "none"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.chain.levels[0].boundary, BoundarySetting::TradingDay);
        assert_eq!(config.chain.levels[0].utc_offset_hours, 8);
        assert_eq!(config.chain.levels[1].boundary, BoundarySetting::None);
    }
}
