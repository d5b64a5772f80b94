//! Overflow float-switch bank.
//!
//! Float switches are wired active low with pull-ups: a high level means dry,
//! a low level means water has reached the switch. A pin that cannot be read
//! is reported as overflow-present: on this input, a broken wire and a
//! flooded tray must look the same to the control core.

use orchid_common::fault::{HardwareFault, PinId, SensorFault};
use orchid_common::hal::{OverflowBatch, OverflowSource, PinDriver};
use std::sync::Arc;
use tracing::{error, warn};

/// Bank of overflow switches read through a shared [`PinDriver`].
pub struct OverflowBank {
    driver: Arc<dyn PinDriver>,
    pins: Vec<PinId>,
}

impl OverflowBank {
    pub fn new(driver: Arc<dyn PinDriver>, pins: Vec<PinId>) -> Self {
        Self { driver, pins }
    }

    /// Sensor id for a switch pin, e.g. `overflow_21`.
    pub fn sensor_id(pin: PinId) -> String {
        format!("overflow_{pin}")
    }
}

impl OverflowSource for OverflowBank {
    fn initialize(&self) -> Result<(), HardwareFault> {
        for &pin in &self.pins {
            self.driver.setup_input(pin, true)?;
        }
        Ok(())
    }

    fn read_all(&self) -> OverflowBatch {
        let mut batch = OverflowBatch::default();

        for &pin in &self.pins {
            let id = Self::sensor_id(pin);
            match self.driver.read(pin) {
                Ok(level) => {
                    // Active low: low level = switch submerged.
                    let overflow = !level;
                    if overflow {
                        warn!("overflow detected on pin {pin}");
                    }
                    batch.states.insert(id, overflow);
                }
                Err(fault) => {
                    // Unreadable switch counts as overflow.
                    error!("overflow sensor pin {pin} unreadable: {fault}");
                    batch.states.insert(id.clone(), true);
                    batch.faults.push(SensorFault::Unavailable {
                        id,
                        cause: fault.to_string(),
                    });
                }
            }
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::SimGpioDriver;

    fn bank() -> (Arc<SimGpioDriver>, OverflowBank) {
        let gpio = Arc::new(SimGpioDriver::new());
        let bank = OverflowBank::new(gpio.clone(), vec![21, 22]);
        bank.initialize().expect("initialize");
        (gpio, bank)
    }

    #[test]
    fn dry_switches_report_no_overflow() {
        let (_gpio, bank) = bank();
        // Pull-ups idle high = dry.
        let batch = bank.read_all();
        assert!(!batch.any_overflow());
        assert_eq!(batch.states.len(), 2);
        assert!(batch.faults.is_empty());
    }

    #[test]
    fn low_level_means_overflow() {
        let (gpio, bank) = bank();
        gpio.drive_input(22, false);
        let batch = bank.read_all();
        assert!(batch.any_overflow());
        assert_eq!(batch.states["overflow_22"], true);
        assert_eq!(batch.states["overflow_21"], false);
    }

    #[test]
    fn read_failure_is_overflow_present() {
        let (gpio, bank) = bank();
        gpio.inject_fault(21, true);
        let batch = bank.read_all();
        assert!(batch.any_overflow());
        assert_eq!(batch.states["overflow_21"], true);
        assert_eq!(batch.faults.len(), 1);
        assert!(matches!(
            &batch.faults[0],
            SensorFault::Unavailable { id, .. } if id == "overflow_21"
        ));
    }
}
