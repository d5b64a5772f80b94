//! Pump timeout registry.
//!
//! Tracks, per actuator pin, an absolute deadline. Pure bookkeeping: the
//! registry never touches hardware. [`PumpTimeoutRegistry::sweep`] only
//! *reports* expired pins; the caller (the safety monitor's evaluation pass)
//! forces them off and then unregisters. Keeping detection and actuation
//! decoupled lets one evaluation pass force-stop several expired pumps
//! atomically with respect to the registry's own state.
//!
//! Invariant: at most one live entry per pin. `register` on a pin that
//! already has a deadline fails with [`RegistryError::AlreadyRunning`].

use orchid_common::fault::PinId;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Registry rejection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The pin already has a live deadline; no overlapping activations.
    #[error("pump on pin {pin} already running")]
    AlreadyRunning { pin: PinId },
}

/// Bookkeeping for one registered actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorState {
    pub pin: PinId,
    pub active: bool,
    pub deadline: Option<Instant>,
}

/// Per-pin deadline registry.
#[derive(Debug, Default)]
pub struct PumpTimeoutRegistry {
    deadlines: HashMap<PinId, Instant>,
}

impl PumpTimeoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live deadline of `now + timeout` for `pin`.
    pub fn register(
        &mut self,
        pin: PinId,
        timeout: Duration,
        now: Instant,
    ) -> Result<Instant, RegistryError> {
        if self.deadlines.contains_key(&pin) {
            return Err(RegistryError::AlreadyRunning { pin });
        }
        let deadline = now + timeout;
        self.deadlines.insert(pin, deadline);
        Ok(deadline)
    }

    /// Remove the entry for `pin`. Returns whether one existed.
    pub fn unregister(&mut self, pin: PinId) -> bool {
        self.deadlines.remove(&pin).is_some()
    }

    /// Pins whose deadline has passed. Side-effect-free: entries stay until
    /// the caller has forced the pumps off and calls `unregister`.
    pub fn sweep(&self, now: Instant) -> Vec<PinId> {
        let mut expired: Vec<PinId> = self
            .deadlines
            .iter()
            .filter(|&(_, &deadline)| now > deadline)
            .map(|(&pin, _)| pin)
            .collect();
        expired.sort_unstable();
        expired
    }

    /// Whether `pin` has a live entry.
    pub fn contains(&self, pin: PinId) -> bool {
        self.deadlines.contains_key(&pin)
    }

    /// Time left before `pin` expires (zero if already past).
    pub fn time_remaining(&self, pin: PinId, now: Instant) -> Option<Duration> {
        self.deadlines
            .get(&pin)
            .map(|&deadline| deadline.saturating_duration_since(now))
    }

    /// Drop every entry. Used by emergency shutdown after all actuators have
    /// been forced off.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Registered pins, sorted.
    pub fn pins(&self) -> Vec<PinId> {
        let mut pins: Vec<PinId> = self.deadlines.keys().copied().collect();
        pins.sort_unstable();
        pins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_unregister() {
        let mut reg = PumpTimeoutRegistry::new();
        let now = Instant::now();
        let deadline = reg.register(18, Duration::from_secs(10), now).expect("register");
        assert_eq!(deadline, now + Duration::from_secs(10));
        assert!(reg.contains(18));
        assert!(reg.unregister(18));
        assert!(!reg.contains(18));
        assert!(!reg.unregister(18));
    }

    #[test]
    fn overlapping_registration_rejected() {
        let mut reg = PumpTimeoutRegistry::new();
        let now = Instant::now();
        reg.register(18, Duration::from_secs(10), now).expect("first");
        let err = reg.register(18, Duration::from_secs(5), now).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRunning { pin: 18 });
        // The original deadline is untouched.
        assert_eq!(
            reg.time_remaining(18, now),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn reregister_after_unregister_is_fine() {
        let mut reg = PumpTimeoutRegistry::new();
        let now = Instant::now();
        reg.register(18, Duration::from_secs(10), now).expect("first");
        reg.unregister(18);
        reg.register(18, Duration::from_secs(10), now).expect("second");
    }

    #[test]
    fn sweep_reports_only_expired_and_mutates_nothing() {
        let mut reg = PumpTimeoutRegistry::new();
        let now = Instant::now();
        reg.register(18, Duration::from_secs(1), now).expect("register");
        reg.register(19, Duration::from_secs(100), now).expect("register");
        reg.register(20, Duration::from_secs(2), now).expect("register");

        let later = now + Duration::from_secs(5);
        assert_eq!(reg.sweep(later), vec![18, 20]);
        // Sweep is read-only: entries remain until unregistered.
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.sweep(later), vec![18, 20]);
    }

    #[test]
    fn sweep_at_exact_deadline_is_not_expired() {
        let mut reg = PumpTimeoutRegistry::new();
        let now = Instant::now();
        reg.register(18, Duration::from_secs(1), now).expect("register");
        assert!(reg.sweep(now + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn zero_timeout_expires_immediately_after() {
        let mut reg = PumpTimeoutRegistry::new();
        let now = Instant::now();
        reg.register(18, Duration::ZERO, now).expect("register");
        assert!(reg.sweep(now).is_empty());
        assert_eq!(reg.sweep(now + Duration::from_millis(1)), vec![18]);
    }

    #[test]
    fn time_remaining_saturates_at_zero() {
        let mut reg = PumpTimeoutRegistry::new();
        let now = Instant::now();
        reg.register(18, Duration::from_secs(1), now).expect("register");
        assert_eq!(
            reg.time_remaining(18, now + Duration::from_secs(5)),
            Some(Duration::ZERO)
        );
        assert_eq!(reg.time_remaining(19, now), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut reg = PumpTimeoutRegistry::new();
        let now = Instant::now();
        reg.register(18, Duration::from_secs(1), now).expect("register");
        reg.register(19, Duration::from_secs(1), now).expect("register");
        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.pins(), Vec::<u8>::new());
    }
}
