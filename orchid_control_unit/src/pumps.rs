//! Pump bank: the single mutual-exclusion domain for one pin set.
//!
//! Registry bookkeeping and the physical pin level always change together
//! inside one lock. Three schedules contend on it: the control loop,
//! the safety monitor's sweep, and per-activation deferred force-off timers.
//! Critical sections are short; the only I/O inside the lock is the single
//! pin write.
//!
//! ## Deferred force-off
//!
//! [`PumpBank::activate_with_guard`] schedules a one-shot timer at the
//! activation timeout, running outside the control loop's schedule. A
//! completely hung control loop therefore still cannot leave a pump on;
//! this is the second, independent line of defense beyond the monitor's
//! sweep. Timers carry the bank epoch at spawn time; after
//! [`PumpBank::invalidate_timers`] (shutdown/restart) a stale timer finds a
//! newer epoch and becomes a no-op instead of touching hardware.

use crate::registry::{PumpTimeoutRegistry, RegistryError};
use orchid_common::fault::{HardwareFault, PinId};
use orchid_common::hal::PinDriver;
use orchid_common::status::PumpStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pump activation failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PumpError {
    #[error(transparent)]
    AlreadyRunning(#[from] RegistryError),

    #[error(transparent)]
    Hardware(#[from] HardwareFault),

    /// Activation refused because the pin is not part of this bank.
    #[error("pin {pin} is not a configured pump pin")]
    UnknownPin { pin: PinId },
}

#[derive(Default)]
struct BankState {
    registry: PumpTimeoutRegistry,
    active: HashMap<PinId, bool>,
}

/// Shared pump actuation domain.
pub struct PumpBank {
    driver: Arc<dyn PinDriver>,
    pins: Vec<PinId>,
    /// Runtime cap applied to activations that do not name their own.
    default_timeout: Duration,
    state: Mutex<BankState>,
    /// Bumped on shutdown/restart to invalidate in-flight deferred timers.
    epoch: AtomicU64,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl PumpBank {
    pub fn new(driver: Arc<dyn PinDriver>, pins: Vec<PinId>, default_timeout: Duration) -> Self {
        Self {
            driver,
            pins,
            default_timeout,
            state: Mutex::new(BankState::default()),
            epoch: AtomicU64::new(0),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Configure every pump pin as an output, driven low.
    pub fn init(&self) -> Result<(), HardwareFault> {
        let mut state = self.state.lock();
        for &pin in &self.pins {
            self.driver.setup_output(pin, false)?;
            state.active.insert(pin, false);
        }
        Ok(())
    }

    /// Configured pump pins.
    pub fn pins(&self) -> &[PinId] {
        &self.pins
    }

    /// Current timer-invalidation epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Activate one pump: register the deadline and drive the pin high as a
    /// single step under the lock. `None` falls back to the bank's default
    /// timeout. Fails without side effects if the pin already has a live
    /// deadline or the hardware write fails.
    pub fn activate(&self, pin: PinId, timeout: Option<Duration>) -> Result<Instant, PumpError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        if !self.pins.contains(&pin) {
            return Err(PumpError::UnknownPin { pin });
        }
        let mut state = self.state.lock();
        let deadline = state.registry.register(pin, timeout, Instant::now())?;
        if let Err(fault) = self.driver.set(pin, true) {
            // Roll the bookkeeping back; the pin never turned on.
            state.registry.unregister(pin);
            return Err(fault.into());
        }
        state.active.insert(pin, true);
        info!("pump on pin {pin} started, timeout {:.1}s", timeout.as_secs_f64());
        Ok(deadline)
    }

    /// [`Self::activate`] plus the deferred force-off timer.
    pub fn activate_with_guard(
        self: &Arc<Self>,
        pin: PinId,
        timeout: Option<Duration>,
    ) -> Result<Instant, PumpError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let deadline = self.activate(pin, Some(timeout))?;
        let epoch = self.epoch();
        let bank = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            bank.force_stop_if_epoch(pin, epoch);
        });
        let mut timers = self.timers.lock();
        timers.retain(|t| !t.is_finished());
        timers.push(handle);
        Ok(deadline)
    }

    /// Force one pump off and drop its registry entry. Hardware failure is
    /// logged but does not keep the bookkeeping alive; the pin is treated
    /// as failed-safe either way.
    pub fn force_stop(&self, pin: PinId) {
        let mut state = self.state.lock();
        if let Err(fault) = self.driver.set(pin, false) {
            error!("failed to force stop pump on pin {pin}: {fault}");
        }
        state.active.insert(pin, false);
        state.registry.unregister(pin);
    }

    /// Deferred-timer entry point: no-op when the bank has moved on to a
    /// newer epoch.
    pub fn force_stop_if_epoch(&self, pin: PinId, epoch: u64) {
        if self.epoch() != epoch {
            debug!("stale deferred force-off for pin {pin} ignored");
            return;
        }
        // Only report if the pump was actually still running.
        if self.state.lock().registry.contains(pin) {
            warn!("deferred force-off firing for pump on pin {pin}");
        }
        self.force_stop(pin);
    }

    /// Force every configured pump off and clear the registry, regardless of
    /// per-pin bookkeeping (defense in depth against registry desync).
    pub fn stop_all(&self) {
        let mut state = self.state.lock();
        for &pin in &self.pins {
            if let Err(fault) = self.driver.set(pin, false) {
                error!("failed to stop pump on pin {pin}: {fault}");
            }
            state.active.insert(pin, false);
        }
        state.registry.clear();
    }

    /// One evaluation pass over expired deadlines: force each expired pump
    /// off and unregister it, atomically with respect to the registry.
    /// Returns the pins that were force-stopped.
    pub fn sweep_expired(&self) -> Vec<PinId> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired = state.registry.sweep(now);
        for &pin in &expired {
            error!("pump on pin {pin} exceeded its timeout, forcing off");
            if let Err(fault) = self.driver.set(pin, false) {
                error!("failed to force stop pump on pin {pin}: {fault}");
            }
            state.active.insert(pin, false);
            state.registry.unregister(pin);
        }
        expired
    }

    /// Bump the epoch and abort pending deferred timers. Any timer that
    /// already fired its wakeup finds a stale epoch and does nothing.
    pub fn invalidate_timers(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut timers = self.timers.lock();
        for timer in timers.drain(..) {
            timer.abort();
        }
    }

    /// Whether `pin` has a live registry entry.
    pub fn is_registered(&self, pin: PinId) -> bool {
        self.state.lock().registry.contains(pin)
    }

    /// Whether any pump is currently commanded on.
    pub fn any_active(&self) -> bool {
        self.state.lock().active.values().any(|&on| on)
    }

    /// pin → commanded-on map.
    pub fn states(&self) -> HashMap<PinId, bool> {
        self.state.lock().active.clone()
    }

    /// Status projection for every configured pin.
    pub fn statuses(&self) -> Vec<PumpStatus> {
        let now = Instant::now();
        let state = self.state.lock();
        self.pins
            .iter()
            .map(|&pin| PumpStatus {
                pin,
                active: state.active.get(&pin).copied().unwrap_or(false),
                seconds_remaining: state
                    .registry
                    .time_remaining(pin, now)
                    .map(|d| d.as_secs_f64()),
            })
            .collect()
    }
}
