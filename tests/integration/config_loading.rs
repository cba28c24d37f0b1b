//! Configuration file loading

use rust_decimal_macros::dec;
use scale_engine::config::{Config, ConfigError};
use std::io::Write;

const EXAMPLE: &str = include_str!("../../config.toml.example");

#[test]
fn test_example_config_loads_and_validates() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(EXAMPLE.as_bytes()).unwrap();

    let config = Config::load(file.path()).unwrap();
    let settings = config.validate().unwrap();

    assert_eq!(settings.vault.id, "main");
    assert_eq!(settings.progression.max_stages(), 4);
    assert_eq!(settings.plan.final_fraction(), dec!(0.45));
    assert!(config.telemetry.metrics_port.is_none());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_bad_progression_fails_validation() {
    let toml = EXAMPLE.replace("leverages = [20, 10, 5, 2]", "leverages = [20, 25, 5, 2]");
    let config: Config = toml::from_str(&toml).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::NonDecreasingLeverage { stage: 2, .. })
    ));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let back: Config = toml::from_str(&rendered).unwrap();
    assert_eq!(back.vault.bankroll, config.vault.bankroll);
    assert_eq!(back.profit.levels, config.profit.levels);
}
