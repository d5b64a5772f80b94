//! Control loop.
//!
//! The controller owns the cooperative tick: heartbeat the watchdog, ingest
//! sensors, evaluate safety, drive the watering cycle, and reconcile pump
//! commands. It never bypasses the safety monitor: every pump activation
//! passes the per-pump gate first, and the monitor (plus the per-activation
//! deferred timers) can force pumps off between ticks without the loop's
//! cooperation.
//!
//! Tick failures are tolerated transiently; three consecutive failed ticks
//! latch the emergency state.

use crate::cycle::{self, CycleEffect, CycleInput, WateringCycle};
use crate::pumps::PumpBank;
use crate::safety::SafetyMonitor;
use orchid_common::config::ControllerConfig;
use orchid_common::fault::Fault;
use orchid_common::hal::{MoistureSource, OverflowSource, PinDriver};
use orchid_common::status::ControllerStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consecutive failed ticks before the loop latches the emergency state.
const MAX_TICK_FAILURES: u32 = 3;

struct CoreState {
    cycle: WateringCycle,
    running: bool,
    cycle_count: u64,
    last_watering: Option<Instant>,
    last_readings: HashMap<String, f64>,
    consecutive_failures: u32,
}

/// Top-level irrigation controller.
pub struct Controller {
    config: ControllerConfig,
    driver: Arc<dyn PinDriver>,
    moisture: Arc<dyn MoistureSource>,
    overflow: Arc<dyn OverflowSource>,
    bank: Arc<PumpBank>,
    safety: Arc<SafetyMonitor>,
    state: Mutex<CoreState>,
    started_at: Instant,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        driver: Arc<dyn PinDriver>,
        moisture: Arc<dyn MoistureSource>,
        overflow: Arc<dyn OverflowSource>,
    ) -> Arc<Self> {
        let bank = Arc::new(PumpBank::new(
            driver.clone(),
            config.pumps.pins.clone(),
            Duration::from_secs_f64(config.pumps.timeout),
        ));
        let safety = Arc::new(SafetyMonitor::new(
            bank.clone(),
            driver.clone(),
            &config.safety,
        ));
        let cycle = WateringCycle::new(
            Duration::from_secs_f64(config.watering.flood_duration),
            Duration::from_secs_f64(config.watering.drain_duration),
        );
        Arc::new(Self {
            config,
            driver,
            moisture,
            overflow,
            bank,
            safety,
            state: Mutex::new(CoreState {
                cycle,
                running: false,
                cycle_count: 0,
                last_watering: None,
                last_readings: HashMap::new(),
                consecutive_failures: 0,
            }),
            started_at: Instant::now(),
            task: Mutex::new(None),
        })
    }

    /// Configure hardware, start the safety monitor, and spawn the loop.
    pub fn start(self: &Arc<Self>) -> Result<(), Fault> {
        {
            let mut state = self.state.lock();
            if state.running {
                return Ok(());
            }
            state.running = true;
        }
        if let Err(fault) = self.init_hardware() {
            // Never report running without a loop behind it.
            self.state.lock().running = false;
            return Err(fault);
        }
        self.safety.start_monitoring();

        let controller = Arc::clone(self);
        let interval = Duration::from_secs_f64(self.config.control.tick_interval);
        *self.task.lock() = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !controller.state.lock().running {
                    break;
                }
                controller.run_tick();
            }
        }));
        info!(
            "controller started, tick interval {:.1}s",
            interval.as_secs_f64()
        );
        Ok(())
    }

    fn init_hardware(&self) -> Result<(), Fault> {
        self.bank.init()?;
        self.safety.init()?;
        self.overflow.initialize()?;
        Ok(())
    }

    /// Orderly shutdown: stop the loop and monitor, invalidate deferred
    /// timers, force every pump off, release hardware.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            state.running = false;
            state.cycle.reset();
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.safety.stop_monitoring();
        self.bank.invalidate_timers();
        self.bank.stop_all();
        self.driver.cleanup();
        info!("controller stopped");
    }

    /// Latch the emergency state on request.
    pub fn emergency_shutdown(&self) {
        self.safety.trigger_emergency("shutdown requested");
        self.state.lock().cycle.reset();
    }

    /// Clear the emergency latch if the inputs allow it.
    pub fn reset_emergency(&self) -> Result<(), orchid_common::fault::SafetyViolation> {
        self.safety.reset_emergency()
    }

    /// One tick with failure accounting.
    fn run_tick(&self) {
        match self.tick() {
            Ok(()) => self.state.lock().consecutive_failures = 0,
            Err(fault) => {
                let failures = {
                    let mut state = self.state.lock();
                    state.consecutive_failures += 1;
                    state.consecutive_failures
                };
                error!("control tick failed ({failures}/{MAX_TICK_FAILURES}): {fault}");
                // A failed tick degrades to a safe state before the retry.
                self.bank.stop_all();
                if failures >= MAX_TICK_FAILURES {
                    self.safety.trigger_emergency("repeated control tick failures");
                    self.state.lock().consecutive_failures = 0;
                }
            }
        }
    }

    /// One cooperative control pass.
    pub fn tick(&self) -> Result<(), Fault> {
        let now = Instant::now();
        self.safety.reset_watchdog();
        let monitor_alive = self.safety.verify_liveness();

        let moisture = self.moisture.read_all();
        for fault in &moisture.faults {
            warn!("moisture fault: {fault}");
        }
        for (id, reading) in &moisture.readings {
            debug!("{id}: {:.1}%", reading.value);
        }
        let overflow = self.overflow.read_all();

        let safety_ok = self.safety.check_all() && monitor_alive;

        let input = CycleInput {
            now,
            safety_ok,
            emergency: self.safety.emergency_active(),
            overflow: overflow.any_overflow(),
            should_water: cycle::should_water(
                &moisture,
                self.config.sensors.moisture_threshold,
                Duration::from_secs_f64(self.config.sensors.cache_window),
                now,
            ),
            pumps_active: self.bank.any_active(),
        };

        let effects = {
            let mut state = self.state.lock();
            let mut readings: HashMap<String, f64> = moisture
                .readings
                .iter()
                .map(|(id, r)| (id.clone(), r.value))
                .collect();
            // Overflow switches surface alongside moisture as 0.0/1.0.
            for (id, &submerged) in &overflow.states {
                readings.insert(id.clone(), if submerged { 1.0 } else { 0.0 });
            }
            state.last_readings = readings;
            state.cycle.tick(&input)
        };

        let mut first_fault = None;
        for effect in effects {
            match effect {
                CycleEffect::StartPumps => {
                    if let Err(fault) = self.start_pumps(now) {
                        first_fault.get_or_insert(fault);
                    }
                }
                CycleEffect::StopAllPumps => self.bank.stop_all(),
                CycleEffect::CycleComplete => {
                    self.state.lock().cycle_count += 1;
                }
            }
        }
        match first_fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Start every configured pump that passes the per-pump gate. Gate
    /// refusals degrade the cycle; only a cycle where no pump at all could
    /// start counts as a tick failure.
    fn start_pumps(&self, now: Instant) -> Result<(), Fault> {
        // A flood-phase run is deadline-bounded by the flood itself; the
        // bank's default timeout only caps activations without a schedule.
        let timeout = Duration::from_secs_f64(self.config.watering.flood_duration);
        let mut started = 0usize;
        let mut last_fault = None;
        for &pin in self.bank.pins() {
            if let Err(violation) = self.safety.check_pump_safety(pin) {
                warn!("pump on pin {pin} skipped: {violation}");
                continue;
            }
            match self.bank.activate_with_guard(pin, Some(timeout)) {
                Ok(_) => started += 1,
                Err(fault) => {
                    warn!("pump on pin {pin} failed to start: {fault}");
                    last_fault = Some(fault);
                }
            }
        }
        if started > 0 {
            if started < self.bank.pins().len() {
                warn!(
                    "degraded watering cycle: {started}/{} pumps running",
                    self.bank.pins().len()
                );
            }
            self.state.lock().last_watering = Some(now);
            Ok(())
        } else if let Some(crate::pumps::PumpError::Hardware(fault)) = last_fault {
            Err(fault.into())
        } else {
            // Every pump was gated off; the cycle machine will notice the
            // dead flood next tick and drain.
            Ok(())
        }
    }

    /// Point-in-time status projection.
    pub fn status(&self) -> ControllerStatus {
        let now = Instant::now();
        let state = self.state.lock();
        let safety = self.safety.snapshot();
        ControllerStatus {
            running: state.running,
            emergency_stop: safety.emergency_stop,
            phase: state.cycle.phase(),
            pumps: self.bank.statuses(),
            sensor_readings: state.last_readings.clone(),
            cycle_count: state.cycle_count,
            last_watering_secs_ago: state
                .last_watering
                .map(|at| now.duration_since(at).as_secs_f64()),
            uptime_secs: now.duration_since(self.started_at).as_secs_f64(),
            safety,
        }
    }

    /// Shared safety monitor handle.
    pub fn safety(&self) -> &Arc<SafetyMonitor> {
        &self.safety
    }

    /// Shared pump bank handle.
    pub fn bank(&self) -> &Arc<PumpBank> {
        &self.bank
    }
}
