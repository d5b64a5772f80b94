//! TOML configuration loader with validation.
//!
//! Every field carries a documented default. Out-of-range values never abort
//! startup and never pass through silently: `validate()` replaces them with
//! the default and logs a warning, so the controller always runs with a
//! well-defined record.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::fault::PinId;

/// Usable BCM pin range on the target board (GPIO 2–27).
pub const PIN_MIN: PinId = 2;
/// See [`PIN_MIN`].
pub const PIN_MAX: PinId = 27;

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read {path}: {cause}")]
    Io { path: String, cause: String },

    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(String),
}

/// Pump actuation section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PumpsConfig {
    /// Output pins driving the pump relays.
    pub pins: Vec<PinId>,
    /// Hard per-activation runtime ceiling [s]. Must be > 0.
    pub timeout: f64,
}

impl Default for PumpsConfig {
    fn default() -> Self {
        Self {
            pins: vec![18, 19, 20, 26],
            timeout: 10.0,
        }
    }
}

/// Sensor section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensorsConfig {
    /// Watering triggers when any trusted moisture reading drops below
    /// this percentage. Range [0, 100].
    pub moisture_threshold: f64,
    /// Readings older than this [s] are untrusted for watering decisions.
    pub cache_window: f64,
    /// I2C addresses of the moisture sensors.
    pub moisture_addresses: Vec<u8>,
    /// Input pins of the overflow float switches (active low).
    pub overflow_pins: Vec<PinId>,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            moisture_threshold: 40.0,
            cache_window: 5.0,
            moisture_addresses: vec![0x20, 0x21, 0x22, 0x23],
            overflow_pins: vec![21, 22, 23, 24],
        }
    }
}

/// Watering cycle section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WateringConfig {
    /// Flood phase length [s]. Zero is legal (dry-run verification).
    pub flood_duration: f64,
    /// Drain phase length [s]. Zero is legal.
    pub drain_duration: f64,
}

impl Default for WateringConfig {
    fn default() -> Self {
        Self {
            flood_duration: 300.0,
            drain_duration: 600.0,
        }
    }
}

/// Safety section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    /// Watchdog expiry [s]. Must be > 0.
    pub watchdog_timeout: f64,
    /// Emergency-stop input pin (active low, pull-up).
    pub emergency_pin: PinId,
    /// Safety monitor evaluation cadence [s]. Must be > 0.
    pub check_interval: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout: 30.0,
            emergency_pin: 25,
            check_interval: 1.0,
        }
    }
}

/// Control loop section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    /// Control loop tick cadence [s]. Must be > 0.
    pub tick_interval: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { tick_interval: 1.0 }
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    pub pumps: PumpsConfig,
    pub sensors: SensorsConfig,
    pub watering: WateringConfig,
    pub safety: SafetyConfig,
    pub control: ControlConfig,
}

impl ControllerConfig {
    /// Load from a TOML file. A missing file yields the full default record
    /// with a warning, matching the fail-soft config policy.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("config file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    cause: e.to_string(),
                });
            }
        };
        Self::from_toml(&text)
    }

    /// Parse from a TOML string (also the test entry point).
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate();
        Ok(config)
    }

    /// Replace out-of-range values with documented defaults, warning on each.
    pub fn validate(&mut self) {
        let d = Self::default();

        self.pumps.pins = sanitize_pins("pumps.pins", &self.pumps.pins, &d.pumps.pins);
        self.sensors.overflow_pins = sanitize_pins(
            "sensors.overflow_pins",
            &self.sensors.overflow_pins,
            &d.sensors.overflow_pins,
        );

        if !(self.pumps.timeout > 0.0) {
            warn!(
                "pumps.timeout = {} invalid, using default {}",
                self.pumps.timeout, d.pumps.timeout
            );
            self.pumps.timeout = d.pumps.timeout;
        }
        if !(0.0..=100.0).contains(&self.sensors.moisture_threshold) {
            warn!(
                "sensors.moisture_threshold = {} outside [0, 100], using default {}",
                self.sensors.moisture_threshold, d.sensors.moisture_threshold
            );
            self.sensors.moisture_threshold = d.sensors.moisture_threshold;
        }
        if !(self.sensors.cache_window > 0.0) {
            warn!(
                "sensors.cache_window = {} invalid, using default {}",
                self.sensors.cache_window, d.sensors.cache_window
            );
            self.sensors.cache_window = d.sensors.cache_window;
        }
        if !(self.watering.flood_duration >= 0.0) {
            warn!(
                "watering.flood_duration = {} negative, using default {}",
                self.watering.flood_duration, d.watering.flood_duration
            );
            self.watering.flood_duration = d.watering.flood_duration;
        }
        if !(self.watering.drain_duration >= 0.0) {
            warn!(
                "watering.drain_duration = {} negative, using default {}",
                self.watering.drain_duration, d.watering.drain_duration
            );
            self.watering.drain_duration = d.watering.drain_duration;
        }
        if !(self.safety.watchdog_timeout > 0.0) {
            warn!(
                "safety.watchdog_timeout = {} invalid, using default {}",
                self.safety.watchdog_timeout, d.safety.watchdog_timeout
            );
            self.safety.watchdog_timeout = d.safety.watchdog_timeout;
        }
        if !(PIN_MIN..=PIN_MAX).contains(&self.safety.emergency_pin) {
            warn!(
                "safety.emergency_pin = {} outside {}..={}, using default {}",
                self.safety.emergency_pin, PIN_MIN, PIN_MAX, d.safety.emergency_pin
            );
            self.safety.emergency_pin = d.safety.emergency_pin;
        }
        if !(self.safety.check_interval > 0.0) {
            warn!(
                "safety.check_interval = {} invalid, using default {}",
                self.safety.check_interval, d.safety.check_interval
            );
            self.safety.check_interval = d.safety.check_interval;
        }
        if !(self.control.tick_interval > 0.0) {
            warn!(
                "control.tick_interval = {} invalid, using default {}",
                self.control.tick_interval, d.control.tick_interval
            );
            self.control.tick_interval = d.control.tick_interval;
        }
    }
}

/// Drop out-of-range and duplicate pins; fall back to the default set if
/// nothing usable remains.
fn sanitize_pins(field: &str, pins: &[PinId], default: &[PinId]) -> Vec<PinId> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(pins.len());
    for &pin in pins {
        if !(PIN_MIN..=PIN_MAX).contains(&pin) {
            warn!("{field}: pin {pin} outside {PIN_MIN}..={PIN_MAX}, dropped");
            continue;
        }
        if !seen.insert(pin) {
            warn!("{field}: duplicate pin {pin} dropped");
            continue;
        }
        out.push(pin);
    }
    if out.is_empty() {
        warn!("{field}: no usable pins, using default {default:?}");
        return default.to_vec();
    }
    out
}
