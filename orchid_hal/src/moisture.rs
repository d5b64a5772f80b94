//! Moisture sensor bank.
//!
//! Models a bank of capacitive soil sensors addressed on an I2C bus. Each
//! channel carries a dry/wet calibration pair; raw capacitance counts are
//! converted to a 0–100 % moisture figure (lower capacitance = wetter).
//!
//! Failure isolation: a channel that cannot be read contributes a
//! [`SensorFault`] to the batch and, if available, its *last good* reading
//! with the original timestamp; the consumer decides whether that cached
//! value is still trustworthy. A bad channel never fails the whole pass.
//!
//! The simulated transport is driven through [`MoistureBank::set_raw`] and
//! [`MoistureBank::set_failed`]; a real I2C backend would replace only the
//! raw-count acquisition.

use orchid_common::fault::SensorFault;
use orchid_common::hal::{MoistureBatch, MoistureSource, TimedReading};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

/// Largest raw count the ADC can produce; anything above is a wiring fault.
const RAW_MAX: u16 = 1023;

/// Dry/wet raw calibration pair for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Raw count when completely dry.
    pub dry: u16,
    /// Raw count when fully saturated.
    pub wet: u16,
}

impl Default for Calibration {
    fn default() -> Self {
        // Typical uncalibrated Chirp-style sensor.
        Self { dry: 500, wet: 200 }
    }
}

/// Convert a raw capacitance count to a moisture percentage, clamped to
/// [0, 100]. A degenerate calibration (dry == wet) reads as 50 %.
pub fn raw_to_percent(calibration: Calibration, raw: u16) -> f64 {
    let dry = f64::from(calibration.dry);
    let wet = f64::from(calibration.wet);
    if dry == wet {
        return 50.0;
    }
    let percent = (dry - f64::from(raw)) / (dry - wet) * 100.0;
    percent.clamp(0.0, 100.0)
}

struct Channel {
    calibration: Calibration,
    raw: u16,
    failing: bool,
    last_good: Option<TimedReading>,
}

/// Bank of moisture channels keyed by sensor id (`moisture_<addr hex>`).
pub struct MoistureBank {
    cache_window: Duration,
    channels: Mutex<HashMap<String, Channel>>,
}

impl MoistureBank {
    /// Build a bank for the given I2C addresses. Channels start at a neutral
    /// mid-scale raw count (reads as ~50 %).
    pub fn new(addresses: &[u8], cache_window: Duration) -> Self {
        let channels = addresses
            .iter()
            .map(|addr| {
                (
                    sensor_id(*addr),
                    Channel {
                        calibration: Calibration::default(),
                        raw: 350,
                        failing: false,
                        last_good: None,
                    },
                )
            })
            .collect();
        Self {
            cache_window,
            channels: Mutex::new(channels),
        }
    }

    /// Store a calibration pair for one channel.
    pub fn calibrate(&self, id: &str, calibration: Calibration) {
        if let Some(ch) = self.channels.lock().get_mut(id) {
            ch.calibration = calibration;
        }
    }

    /// Set the raw count the simulated transport will report.
    pub fn set_raw(&self, id: &str, raw: u16) {
        if let Some(ch) = self.channels.lock().get_mut(id) {
            ch.raw = raw;
        }
    }

    /// Convenience: set a channel so it reads as the given percentage.
    pub fn set_percent(&self, id: &str, percent: f64) {
        let mut channels = self.channels.lock();
        if let Some(ch) = channels.get_mut(id) {
            let dry = f64::from(ch.calibration.dry);
            let wet = f64::from(ch.calibration.wet);
            let raw = dry - percent.clamp(0.0, 100.0) / 100.0 * (dry - wet);
            ch.raw = raw.round() as u16;
        }
    }

    /// Make a channel fail on every subsequent read pass.
    pub fn set_failed(&self, id: &str, failing: bool) {
        if let Some(ch) = self.channels.lock().get_mut(id) {
            ch.failing = failing;
        }
    }

    /// Sensor ids in this bank.
    pub fn ids(&self) -> Vec<String> {
        self.channels.lock().keys().cloned().collect()
    }
}

/// Sensor id for an I2C address, e.g. `moisture_20` for 0x20.
pub fn sensor_id(address: u8) -> String {
    format!("moisture_{address:02x}")
}

impl MoistureSource for MoistureBank {
    fn read_all(&self) -> MoistureBatch {
        let now = Instant::now();
        let mut batch = MoistureBatch::default();
        let mut channels = self.channels.lock();

        for (id, ch) in channels.iter_mut() {
            if ch.failing {
                warn!("moisture sensor {id} unreadable");
                batch.faults.push(SensorFault::Unavailable {
                    id: id.clone(),
                    cause: "transport error".into(),
                });
                // Hand out the cached reading with its original timestamp;
                // the consumer judges staleness.
                if let Some(cached) = ch.last_good {
                    batch.readings.insert(id.clone(), cached);
                }
                continue;
            }

            // Fresh cache hit: skip the (simulated) bus transaction.
            if let Some(cached) = ch.last_good {
                if now.duration_since(cached.taken_at) < self.cache_window {
                    batch.readings.insert(id.clone(), cached);
                    continue;
                }
            }

            if ch.raw > RAW_MAX {
                warn!("moisture sensor {id}: raw count {} out of range", ch.raw);
                batch.faults.push(SensorFault::OutOfRange {
                    id: id.clone(),
                    value: f64::from(ch.raw),
                });
                if let Some(cached) = ch.last_good {
                    batch.readings.insert(id.clone(), cached);
                }
                continue;
            }

            let reading = TimedReading {
                value: raw_to_percent(ch.calibration, ch.raw),
                taken_at: now,
            };
            ch.last_good = Some(reading);
            batch.readings.insert(id.clone(), reading);
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> MoistureBank {
        // Zero cache window so every read pass hits the "bus".
        MoistureBank::new(&[0x20, 0x21], Duration::ZERO)
    }

    #[test]
    fn raw_conversion_spans_calibration_range() {
        let cal = Calibration { dry: 500, wet: 200 };
        assert_eq!(raw_to_percent(cal, 500), 0.0);
        assert_eq!(raw_to_percent(cal, 200), 100.0);
        assert_eq!(raw_to_percent(cal, 350), 50.0);
        // Clamped outside the calibrated range.
        assert_eq!(raw_to_percent(cal, 600), 0.0);
        assert_eq!(raw_to_percent(cal, 100), 100.0);
    }

    #[test]
    fn degenerate_calibration_reads_mid_scale() {
        let cal = Calibration { dry: 300, wet: 300 };
        assert_eq!(raw_to_percent(cal, 123), 50.0);
    }

    #[test]
    fn read_all_reports_every_channel() {
        let bank = bank();
        let batch = bank.read_all();
        assert_eq!(batch.readings.len(), 2);
        assert!(batch.faults.is_empty());
        assert!(batch.readings.contains_key("moisture_20"));
        assert!(batch.readings.contains_key("moisture_21"));
    }

    #[test]
    fn set_percent_round_trips() {
        let bank = bank();
        bank.set_percent("moisture_20", 35.0);
        let batch = bank.read_all();
        let reading = batch.readings["moisture_20"];
        assert!((reading.value - 35.0).abs() < 1.0, "got {}", reading.value);
    }

    #[test]
    fn failed_channel_yields_fault_and_cached_reading() {
        let bank = bank();
        bank.set_percent("moisture_20", 30.0);
        let first = bank.read_all();
        let cached = first.readings["moisture_20"];

        bank.set_failed("moisture_20", true);
        let second = bank.read_all();
        assert_eq!(second.faults.len(), 1);
        assert!(matches!(
            &second.faults[0],
            SensorFault::Unavailable { id, .. } if id == "moisture_20"
        ));
        // Cached value survives with its original timestamp.
        assert_eq!(second.readings["moisture_20"], cached);
        // The healthy channel is unaffected.
        assert!(second.readings.contains_key("moisture_21"));
    }

    #[test]
    fn failed_channel_without_history_has_no_reading() {
        let bank = bank();
        bank.set_failed("moisture_20", true);
        let batch = bank.read_all();
        assert!(!batch.readings.contains_key("moisture_20"));
        assert_eq!(batch.faults.len(), 1);
    }

    #[test]
    fn out_of_range_raw_is_a_fault() {
        let bank = bank();
        bank.set_raw("moisture_20", 2000);
        let batch = bank.read_all();
        assert!(matches!(
            &batch.faults[0],
            SensorFault::OutOfRange { id, value } if id == "moisture_20" && *value == 2000.0
        ));
        assert!(!batch.readings.contains_key("moisture_20"));
    }

    #[test]
    fn fresh_cache_skips_bus() {
        let bank = MoistureBank::new(&[0x20], Duration::from_secs(60));
        bank.set_percent("moisture_20", 30.0);
        let first = bank.read_all();
        // Change the raw value; the cached reading should still be returned.
        bank.set_percent("moisture_20", 90.0);
        let second = bank.read_all();
        assert_eq!(
            second.readings["moisture_20"].value,
            first.readings["moisture_20"].value
        );
    }
}
