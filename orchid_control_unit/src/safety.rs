//! Safety monitor.
//!
//! Runs on its own schedule, independent of the control loop, and owns every
//! path into the latched emergency state. One evaluation pass checks, in
//! order: the emergency input, the watchdog, host memory headroom, and the
//! pump timeout registry. The emergency latch, once set, persists until an
//! explicit [`SafetyMonitor::reset_emergency`] that re-validates the inputs.
//! The condition merely going away never clears it.
//!
//! Fail-safe conventions: an unreadable emergency input counts as pressed,
//! and a memory probe that cannot be evaluated counts as exhausted.

use crate::pumps::PumpBank;
use orchid_common::config::SafetyConfig;
use orchid_common::fault::{PinId, SafetyViolation, ViolationFlags};
use orchid_common::hal::PinDriver;
use orchid_common::status::SafetySnapshot;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Memory usage above this fraction of total counts as resource exhaustion.
const MEMORY_LIMIT_PERCENT: f64 = 90.0;

/// Monitor passes older than this many check intervals count as a stall.
const STALL_INTERVALS: u32 = 3;

struct MonitorState {
    emergency_active: bool,
    watchdog_last_reset: Instant,
    violations: ViolationFlags,
    monitoring: bool,
    last_pass: Option<Instant>,
}

/// Global safety predicate evaluator and emergency latch.
pub struct SafetyMonitor {
    bank: Arc<PumpBank>,
    driver: Arc<dyn PinDriver>,
    emergency_pin: PinId,
    watchdog_timeout: Duration,
    check_interval: Duration,
    state: Mutex<MonitorState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SafetyMonitor {
    pub fn new(bank: Arc<PumpBank>, driver: Arc<dyn PinDriver>, cfg: &SafetyConfig) -> Self {
        Self {
            bank,
            driver,
            emergency_pin: cfg.emergency_pin,
            watchdog_timeout: Duration::from_secs_f64(cfg.watchdog_timeout),
            check_interval: Duration::from_secs_f64(cfg.check_interval),
            state: Mutex::new(MonitorState {
                emergency_active: false,
                watchdog_last_reset: Instant::now(),
                violations: ViolationFlags::empty(),
                monitoring: false,
                last_pass: None,
            }),
            task: Mutex::new(None),
        }
    }

    /// Configure the emergency input (pull-up, active low).
    pub fn init(&self) -> Result<(), orchid_common::fault::HardwareFault> {
        self.driver.setup_input(self.emergency_pin, true)
    }

    /// One ordered evaluation pass over every safety predicate. Returns
    /// whether the system is currently safe to water.
    pub fn check_all(&self) -> bool {
        let now = Instant::now();

        // 1. Emergency input. Active low; an unreadable pin is a pressed pin.
        let pressed = match self.driver.read(self.emergency_pin) {
            Ok(level) => !level,
            Err(fault) => {
                error!(
                    "emergency input pin {} unreadable, treating as pressed: {fault}",
                    self.emergency_pin
                );
                true
            }
        };
        if pressed {
            self.trigger_emergency("emergency input active");
        }

        // 2. Watchdog.
        let elapsed = {
            let state = self.state.lock();
            now.duration_since(state.watchdog_last_reset)
        };
        if elapsed > self.watchdog_timeout {
            self.eval_violation(ViolationFlags::WATCHDOG_EXPIRED, true);
            self.trigger_emergency(&format!(
                "watchdog expired after {:.1}s without a control loop pass",
                elapsed.as_secs_f64()
            ));
        } else {
            self.eval_violation(ViolationFlags::WATCHDOG_EXPIRED, false);
        }

        // 3. Host memory headroom. Evaluation failure counts as exhaustion.
        let exhausted = match memory_usage_percent() {
            Ok(percent) => {
                if percent > MEMORY_LIMIT_PERCENT {
                    warn!("memory usage {percent:.1}% exceeds {MEMORY_LIMIT_PERCENT:.0}% limit");
                    true
                } else {
                    false
                }
            }
            Err(cause) => {
                warn!("memory probe failed, treating as exhausted: {cause}");
                true
            }
        };
        self.eval_violation(ViolationFlags::RESOURCE_EXHAUSTED, exhausted);

        // 4. Pump deadlines. The sweep forces expired pumps off itself.
        let expired = self.bank.sweep_expired();
        self.eval_violation(ViolationFlags::PUMP_TIMEOUT, !expired.is_empty());

        let state = self.state.lock();
        !state.emergency_active && state.violations.is_empty()
    }

    /// Per-pump gate evaluated immediately before activation. Runs its own
    /// full evaluation pass; cached flags alone are never trusted, so the
    /// gate is safe to call without a preceding [`Self::check_all`].
    pub fn check_pump_safety(&self, pin: PinId) -> Result<(), SafetyViolation> {
        self.check_all();
        let state = self.state.lock();
        if state.emergency_active {
            return Err(SafetyViolation::EmergencyStop);
        }
        if let Some(violation) = Self::first_violation(&state, pin) {
            return Err(violation);
        }
        if self.bank.is_registered(pin) {
            return Err(SafetyViolation::PumpTimeout { pin });
        }
        Ok(())
    }

    /// Map the set flags to an error value, most severe first.
    fn first_violation(state: &MonitorState, pin: PinId) -> Option<SafetyViolation> {
        let v = state.violations;
        if v.contains(ViolationFlags::WATCHDOG_EXPIRED) {
            Some(SafetyViolation::WatchdogExpired {
                elapsed_secs: state.watchdog_last_reset.elapsed().as_secs_f64(),
            })
        } else if v.contains(ViolationFlags::RESOURCE_EXHAUSTED) {
            Some(SafetyViolation::ResourceExhausted {
                detail: "host memory headroom below limit".into(),
            })
        } else if v.contains(ViolationFlags::MONITOR_STALLED) {
            Some(SafetyViolation::MonitorStalled)
        } else if v.contains(ViolationFlags::PUMP_TIMEOUT) {
            Some(SafetyViolation::PumpTimeout { pin })
        } else {
            None
        }
    }

    /// Latch the emergency state and force every pump off. Idempotent: a
    /// second trigger while latched only logs at debug.
    pub fn trigger_emergency(&self, reason: &str) {
        {
            let mut state = self.state.lock();
            if state.emergency_active {
                debug!("emergency already latched ({reason})");
                return;
            }
            state.emergency_active = true;
            state.violations.insert(ViolationFlags::EMERGENCY_STOP);
        }
        error!("EMERGENCY STOP: {reason}");
        self.bank.stop_all();
    }

    /// Clear the latch, but only after re-validating the inputs that can
    /// latch it: a still-pressed emergency input or exhausted memory refuses
    /// the reset.
    pub fn reset_emergency(&self) -> Result<(), SafetyViolation> {
        let pressed = match self.driver.read(self.emergency_pin) {
            Ok(level) => !level,
            Err(_) => true,
        };
        if pressed {
            warn!("emergency reset refused: input still active");
            return Err(SafetyViolation::EmergencyStop);
        }
        let memory_ok = matches!(memory_usage_percent(), Ok(p) if p <= MEMORY_LIMIT_PERCENT);
        if !memory_ok {
            warn!("emergency reset refused: memory headroom below limit");
            return Err(SafetyViolation::ResourceExhausted {
                detail: "host memory headroom below limit".into(),
            });
        }

        let mut state = self.state.lock();
        state.emergency_active = false;
        state.violations = ViolationFlags::empty();
        state.watchdog_last_reset = Instant::now();
        info!("emergency stop reset");
        Ok(())
    }

    /// Record one control loop heartbeat.
    pub fn reset_watchdog(&self) {
        self.state.lock().watchdog_last_reset = Instant::now();
    }

    /// Whether the emergency latch is set.
    pub fn emergency_active(&self) -> bool {
        self.state.lock().emergency_active
    }

    /// Re-evaluate the monitor's own liveness; sets or clears the stall
    /// violation and returns whether the monitor is healthy. Called from the
    /// control loop so a silently dead monitor task still gets noticed.
    pub fn verify_liveness(&self) -> bool {
        let now = Instant::now();
        let stalled = {
            let state = self.state.lock();
            state.monitoring
                && match state.last_pass {
                    Some(at) => now.duration_since(at) > self.check_interval * STALL_INTERVALS,
                    None => false,
                }
        };
        self.eval_violation(ViolationFlags::MONITOR_STALLED, stalled);
        !stalled
    }

    /// Spawn the background evaluation task.
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        self.state.lock().monitoring = true;
        let monitor = Arc::clone(self);
        let interval = self.check_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !monitor.state.lock().monitoring {
                    break;
                }
                monitor.check_all();
                // Liveness is proven by the task, not by ad-hoc evaluation
                // passes, so a dead task stays detectable.
                monitor.state.lock().last_pass = Some(Instant::now());
            }
        }));
        info!(
            "safety monitoring started, interval {:.1}s",
            interval.as_secs_f64()
        );
    }

    /// Stop the background task.
    pub fn stop_monitoring(&self) {
        self.state.lock().monitoring = false;
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        info!("safety monitoring stopped");
    }

    /// Point-in-time snapshot for status reporting.
    pub fn snapshot(&self) -> SafetySnapshot {
        let state = self.state.lock();
        let remaining = self
            .watchdog_timeout
            .saturating_sub(Instant::now().duration_since(state.watchdog_last_reset));
        SafetySnapshot {
            monitoring: state.monitoring,
            emergency_stop: state.emergency_active,
            active_violations: state
                .violations
                .describe()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            watchdog_seconds_remaining: remaining.as_secs_f64(),
        }
    }

    /// Set or clear one violation flag, logging only on transitions.
    fn eval_violation(&self, flag: ViolationFlags, condition: bool) {
        let mut state = self.state.lock();
        let present = state.violations.contains(flag);
        if condition && !present {
            state.violations.insert(flag);
            error!("safety violation set: {:?}", flag.describe());
        } else if !condition && present && flag != ViolationFlags::EMERGENCY_STOP {
            state.violations.remove(flag);
            info!("safety violation cleared: {:?}", flag.describe());
        }
    }
}

/// Percentage of host memory in use, from /proc/meminfo.
fn memory_usage_percent() -> Result<f64, String> {
    let text =
        std::fs::read_to_string("/proc/meminfo").map_err(|e| format!("/proc/meminfo: {e}"))?;
    parse_meminfo(&text)
}

fn parse_meminfo(text: &str) -> Result<f64, String> {
    let mut total = None;
    let mut available = None;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kib(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kib(rest);
        }
    }
    match (total, available) {
        (Some(total), Some(available)) if total > 0.0 => {
            Ok(100.0 * (1.0 - available / total))
        }
        _ => Err("missing MemTotal/MemAvailable".into()),
    }
}

fn parse_kib(rest: &str) -> Option<f64> {
    rest.split_whitespace().next()?.parse().ok()
}
