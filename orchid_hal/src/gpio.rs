//! Simulated GPIO driver.
//!
//! Software backend for development and host-side testing. Pin semantics
//! match the target board: BCM numbering, pins 2–27 usable, outputs must be
//! configured before they can be driven. All state lives behind one lock;
//! the critical sections are pure memory writes.
//!
//! Test hooks: [`SimGpioDriver::drive_input`] sets the level an input pin
//! will read, [`SimGpioDriver::inject_fault`] makes a pin fail with a
//! transport error on every subsequent access, and
//! [`SimGpioDriver::pin_state`] inspects output levels.

use orchid_common::config::{PIN_MAX, PIN_MIN};
use orchid_common::fault::{HardwareFault, PinId};
use orchid_common::hal::PinDriver;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinMode {
    Output,
    Input { pull_up: bool },
}

#[derive(Debug, Clone, Copy)]
struct PinSlot {
    mode: PinMode,
    level: bool,
    failing: bool,
}

/// Simulated digital pin driver.
#[derive(Debug, Default)]
pub struct SimGpioDriver {
    pins: Mutex<HashMap<PinId, PinSlot>>,
}

impl SimGpioDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of a configured pin, regardless of direction.
    pub fn pin_state(&self, pin: PinId) -> Option<bool> {
        self.pins.lock().get(&pin).map(|slot| slot.level)
    }

    /// Set the level an input pin will read. Panics in tests if the pin was
    /// never configured as an input.
    pub fn drive_input(&self, pin: PinId, level: bool) {
        let mut pins = self.pins.lock();
        let slot = pins
            .get_mut(&pin)
            .unwrap_or_else(|| panic!("drive_input on unconfigured pin {pin}"));
        assert!(
            matches!(slot.mode, PinMode::Input { .. }),
            "drive_input on non-input pin {pin}"
        );
        slot.level = level;
    }

    /// Make every subsequent access to `pin` fail with a transport error.
    pub fn inject_fault(&self, pin: PinId, failing: bool) {
        if let Some(slot) = self.pins.lock().get_mut(&pin) {
            slot.failing = failing;
        }
    }

    /// Levels of all configured pins, for assertions.
    pub fn all_pin_states(&self) -> HashMap<PinId, bool> {
        self.pins
            .lock()
            .iter()
            .map(|(&pin, slot)| (pin, slot.level))
            .collect()
    }

    fn validate(pin: PinId) -> Result<(), HardwareFault> {
        if (PIN_MIN..=PIN_MAX).contains(&pin) {
            Ok(())
        } else {
            Err(HardwareFault::InvalidPin {
                pin,
                cause: format!("usable BCM pins are {PIN_MIN}..={PIN_MAX}"),
            })
        }
    }

    fn transport_check(slot: &PinSlot, pin: PinId) -> Result<(), HardwareFault> {
        if slot.failing {
            Err(HardwareFault::Transport {
                pin,
                cause: "injected fault".into(),
            })
        } else {
            Ok(())
        }
    }
}

impl PinDriver for SimGpioDriver {
    fn setup_output(&self, pin: PinId, initial: bool) -> Result<(), HardwareFault> {
        Self::validate(pin)?;
        debug!("gpio: setup output pin {pin}, initial={initial}");
        self.pins.lock().insert(
            pin,
            PinSlot {
                mode: PinMode::Output,
                level: initial,
                failing: false,
            },
        );
        Ok(())
    }

    fn setup_input(&self, pin: PinId, pull_up: bool) -> Result<(), HardwareFault> {
        Self::validate(pin)?;
        debug!("gpio: setup input pin {pin}, pull_up={pull_up}");
        self.pins.lock().insert(
            pin,
            PinSlot {
                mode: PinMode::Input { pull_up },
                // Pull-up inputs idle high; floating inputs idle low.
                level: pull_up,
                failing: false,
            },
        );
        Ok(())
    }

    fn set(&self, pin: PinId, state: bool) -> Result<(), HardwareFault> {
        Self::validate(pin)?;
        let mut pins = self.pins.lock();
        let slot = pins.get_mut(&pin).ok_or(HardwareFault::NotConfigured {
            pin,
            expected: "output",
        })?;
        Self::transport_check(slot, pin)?;
        if slot.mode != PinMode::Output {
            return Err(HardwareFault::NotConfigured {
                pin,
                expected: "output",
            });
        }
        slot.level = state;
        Ok(())
    }

    fn read(&self, pin: PinId) -> Result<bool, HardwareFault> {
        Self::validate(pin)?;
        let pins = self.pins.lock();
        let slot = pins.get(&pin).ok_or(HardwareFault::NotConfigured {
            pin,
            expected: "input",
        })?;
        Self::transport_check(slot, pin)?;
        Ok(slot.level)
    }

    fn cleanup(&self) {
        debug!("gpio: cleanup");
        self.pins.lock().clear();
    }
}
