//! Integration tests for loading and saving config files.

use std::fs;
use std::path::PathBuf;

use chan_config::{BoundarySetting, Config, ConfigError, EngineOverride};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("chan-config-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir.join("chan.toml")
}

/// Test a saved config loads back unchanged.
#[test]
fn test_save_then_load() {
    let path = scratch("save");
    let mut config = Config::default();
    config.engine.third_type_lookback = 5;
    config.frequencies.insert(
        "30m".to_string(),
        EngineOverride {
            include_containment: Some(false),
            ..Default::default()
        },
    );
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.engine, config.engine);
    assert_eq!(loaded.chain, config.chain);
    assert!(!loaded.engine_for_frequency("30m").include_containment);
    assert_eq!(loaded.chain.levels[0].boundary, BoundarySetting::TradingDay);

    fs::remove_file(&path).unwrap();
}

/// Test a missing file surfaces as a read error.
#[test]
fn test_missing_file() {
    let path = scratch("missing").with_file_name("absent.toml");
    assert!(matches!(Config::load(&path), Err(ConfigError::ReadError(_))));
}

/// Test malformed TOML surfaces as a parse error.
#[test]
fn test_malformed_file() {
    let path = scratch("malformed");
    fs::write(&path, "[engine\nuse_resonance = ").unwrap();
    assert!(matches!(Config::load(&path), Err(ConfigError::ParseError(_))));
    fs::remove_file(&path).unwrap();
}
