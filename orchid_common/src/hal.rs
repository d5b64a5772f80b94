//! Hardware capability traits.
//!
//! The control core consumes hardware exclusively through these traits:
//!
//! - [`PinDriver`] — logical digital pin I/O. Implementations own the raw
//!   transport; every operation either completes bounded or fails with
//!   [`HardwareFault`].
//! - [`MoistureSource`] — produces timestamped moisture percentages.
//!   Partial failures return partial readings plus a fault list; a single
//!   bad sensor never fails the whole read.
//! - [`OverflowSource`] — float-switch states. A failed read is reported as
//!   overflow-present (fail-safe), never as absent.
//!
//! All traits take `&self`: implementations are shared across the control
//! loop, the safety monitor, and deferred timers, and guard their own state.

use crate::fault::{HardwareFault, PinId, SensorFault};
use std::collections::HashMap;
use std::time::Instant;

/// Digital pin I/O capability.
pub trait PinDriver: Send + Sync {
    /// Configure `pin` as an output, driven to `initial` immediately.
    fn setup_output(&self, pin: PinId, initial: bool) -> Result<(), HardwareFault>;

    /// Configure `pin` as an input, optionally with the internal pull-up.
    fn setup_input(&self, pin: PinId, pull_up: bool) -> Result<(), HardwareFault>;

    /// Drive an output pin.
    fn set(&self, pin: PinId, state: bool) -> Result<(), HardwareFault>;

    /// Read an input pin level (true = high).
    fn read(&self, pin: PinId) -> Result<bool, HardwareFault>;

    /// Release all configured pins. Idempotent; never fails.
    fn cleanup(&self);
}

/// A sensor value together with the time it was taken.
///
/// Readings older than the configured cache window must not be trusted for
/// watering decisions; staleness is judged by the consumer against `taken_at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedReading {
    /// Moisture percentage, 0–100.
    pub value: f64,
    /// When the reading was produced.
    pub taken_at: Instant,
}

/// Result of one moisture read pass: partial readings plus faults.
#[derive(Debug, Clone, Default)]
pub struct MoistureBatch {
    /// sensor-id → latest reading (possibly cached from an earlier pass).
    pub readings: HashMap<String, TimedReading>,
    /// Sensors that failed this pass.
    pub faults: Vec<SensorFault>,
}

impl Default for TimedReading {
    fn default() -> Self {
        Self {
            value: 0.0,
            taken_at: Instant::now(),
        }
    }
}

/// Moisture sensor capability.
pub trait MoistureSource: Send + Sync {
    /// Read every sensor; never fails wholesale.
    fn read_all(&self) -> MoistureBatch;
}

/// Result of one overflow read pass.
#[derive(Debug, Clone, Default)]
pub struct OverflowBatch {
    /// sensor-id → overflow detected.
    pub states: HashMap<String, bool>,
    /// Sensors that failed this pass (already folded into `states` as
    /// overflow-present).
    pub faults: Vec<SensorFault>,
}

impl OverflowBatch {
    /// True if any switch reports overflow.
    pub fn any_overflow(&self) -> bool {
        self.states.values().any(|&v| v)
    }
}

/// Overflow float-switch capability.
pub trait OverflowSource: Send + Sync {
    /// Set up the underlying pins. Called once before the loop starts.
    fn initialize(&self) -> Result<(), HardwareFault>;

    /// Read every switch; failures are folded in as overflow-present.
    fn read_all(&self) -> OverflowBatch;
}
