//! Fault taxonomy for the irrigation control core.
//!
//! Four classes, propagated explicitly (callers pattern-match, never catch
//! broadly):
//!
//! - [`HardwareFault`] — pin/bus failure. Logged, pin treated as failed-safe,
//!   the affected actuator is forced off.
//! - [`SensorFault`] — a reading is unavailable, invalid, or stale. Excluded
//!   from watering decisions, never substituted with a default value.
//! - [`SafetyViolation`] — emergency / watchdog / resource / timeout. Always
//!   forces all pumps off; the only class that can latch the emergency flag.
//! - `ConfigError` lives in [`crate::config`] next to the loader.
//!
//! Faults local to one sensor or one pump never abort a tick or a cycle.
//! Faults that imply unknown safety state always escalate to emergency.

use bitflags::bitflags;
use thiserror::Error;

/// Logical BCM pin number.
pub type PinId = u8;

/// Pin or bus transport failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HardwareFault {
    /// Pin number outside the usable BCM range.
    #[error("invalid GPIO pin {pin}: {cause}")]
    InvalidPin { pin: PinId, cause: String },

    /// Pin was never configured, or configured in the wrong direction.
    #[error("pin {pin} not configured as {expected}")]
    NotConfigured { pin: PinId, expected: &'static str },

    /// Transport-level failure talking to the pin.
    #[error("transport error on pin {pin}: {cause}")]
    Transport { pin: PinId, cause: String },
}

impl HardwareFault {
    /// The pin this fault refers to.
    pub fn pin(&self) -> PinId {
        match self {
            Self::InvalidPin { pin, .. }
            | Self::NotConfigured { pin, .. }
            | Self::Transport { pin, .. } => *pin,
        }
    }
}

/// A single sensor produced no trustworthy reading.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SensorFault {
    /// The sensor could not be read at all.
    #[error("sensor {id}: reading unavailable: {cause}")]
    Unavailable { id: String, cause: String },

    /// The sensor produced a value outside its plausible range.
    #[error("sensor {id}: reading {value} out of range")]
    OutOfRange { id: String, value: f64 },
}

bitflags! {
    /// Set of currently-active safety violations.
    ///
    /// Maintained by the safety monitor's evaluation pass; any non-empty set
    /// means "not safe to act".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ViolationFlags: u8 {
        /// Emergency stop latched (or emergency input pressed).
        const EMERGENCY_STOP     = 0x01;
        /// Watchdog not reset within the configured timeout.
        const WATCHDOG_EXPIRED   = 0x02;
        /// System resource headroom exhausted (or unverifiable).
        const RESOURCE_EXHAUSTED = 0x04;
        /// One or more pumps exceeded their registered deadline.
        const PUMP_TIMEOUT       = 0x08;
        /// Safety monitor itself is not making progress.
        const MONITOR_STALLED    = 0x10;
    }
}

impl Default for ViolationFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl ViolationFlags {
    /// Human-readable names of the set flags, for status reporting.
    pub fn describe(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.contains(Self::EMERGENCY_STOP) {
            out.push("emergency stop active");
        }
        if self.contains(Self::WATCHDOG_EXPIRED) {
            out.push("watchdog timeout exceeded");
        }
        if self.contains(Self::RESOURCE_EXHAUSTED) {
            out.push("system resource limits exceeded");
        }
        if self.contains(Self::PUMP_TIMEOUT) {
            out.push("pump runtime timeout exceeded");
        }
        if self.contains(Self::MONITOR_STALLED) {
            out.push("safety monitor stalled");
        }
        out
    }
}

/// A violated safety condition, as an error value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SafetyViolation {
    #[error("emergency stop active")]
    EmergencyStop,

    #[error("watchdog expired ({elapsed_secs:.1}s since last reset)")]
    WatchdogExpired { elapsed_secs: f64 },

    #[error("system resources exhausted: {detail}")]
    ResourceExhausted { detail: String },

    #[error("pump timeout exceeded on pin {pin}")]
    PumpTimeout { pin: PinId },

    #[error("safety monitor stalled")]
    MonitorStalled,
}

/// Umbrella fault for control-loop tick propagation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Fault {
    #[error(transparent)]
    Hardware(#[from] HardwareFault),

    #[error(transparent)]
    Sensor(#[from] SensorFault),

    #[error(transparent)]
    Safety(#[from] SafetyViolation),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_fault_exposes_pin() {
        let f = HardwareFault::Transport {
            pin: 18,
            cause: "bus stuck".into(),
        };
        assert_eq!(f.pin(), 18);
        assert!(f.to_string().contains("18"));
        assert!(f.to_string().contains("bus stuck"));
    }

    #[test]
    fn violation_flags_describe_all_set() {
        let all = ViolationFlags::all();
        assert_eq!(all.describe().len(), 5);
        assert!(ViolationFlags::empty().describe().is_empty());
    }

    #[test]
    fn violation_flags_default_is_empty() {
        assert_eq!(ViolationFlags::default(), ViolationFlags::empty());
    }

    #[test]
    fn fault_wraps_taxonomy() {
        let f: Fault = SensorFault::OutOfRange {
            id: "moisture_20".into(),
            value: 140.0,
        }
        .into();
        assert!(matches!(f, Fault::Sensor(_)));
        assert!(f.to_string().contains("moisture_20"));
    }
}
