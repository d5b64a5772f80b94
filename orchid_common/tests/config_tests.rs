//! Configuration loading integration tests.
//!
//! Exercises the file-based path (missing file, unreadable file, full round
//! trip through a real TOML on disk) that the in-module unit tests skip.

use orchid_common::config::{ConfigError, ControllerConfig};
use std::io::Write;

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("does_not_exist.toml");
    let config = ControllerConfig::load(&path).expect("load");
    assert_eq!(config, ControllerConfig::default());
}

#[test]
fn full_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("orchid.toml");
    let mut file = std::fs::File::create(&path).expect("create");
    file.write_all(
        br#"
[pumps]
pins = [18, 19]
timeout = 8.0

[sensors]
moisture_threshold = 35.0
cache_window = 3.0
overflow_pins = [21, 22]

[watering]
flood_duration = 120.0
drain_duration = 240.0

[safety]
watchdog_timeout = 20.0
emergency_pin = 25
check_interval = 0.5

[control]
tick_interval = 0.5
"#,
    )
    .expect("write");

    let config = ControllerConfig::load(&path).expect("load");
    assert_eq!(config.pumps.pins, vec![18, 19]);
    assert_eq!(config.pumps.timeout, 8.0);
    assert_eq!(config.sensors.moisture_threshold, 35.0);
    assert_eq!(config.sensors.overflow_pins, vec![21, 22]);
    assert_eq!(config.watering.flood_duration, 120.0);
    assert_eq!(config.safety.watchdog_timeout, 20.0);
    assert_eq!(config.control.tick_interval, 0.5);
}

#[test]
fn parse_error_is_reported_not_defaulted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("orchid.toml");
    std::fs::write(&path, "[pumps]\npins = \"not a list\"\n").expect("write");

    let err = ControllerConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
