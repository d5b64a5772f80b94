//! Watering cycle state machine.
//!
//! Pure and event-driven: each tick takes a snapshot of the world as
//! [`CycleInput`] and returns the [`CycleEffect`]s the caller must apply. The
//! machine never touches hardware and never reads the clock itself, so every
//! path is testable with plain `Instant` arithmetic.
//!
//! Zero-length phases are legal: a tick chains through as many transitions as
//! the input justifies, so `flood_duration = 0` runs Idle → Flooding →
//! Draining (emitting both `StartPumps` and `StopAllPumps`) in one call.

use orchid_common::hal::MoistureBatch;
use orchid_common::status::CyclePhase;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// World snapshot for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct CycleInput {
    pub now: Instant,
    /// All safety predicates passed this tick.
    pub safety_ok: bool,
    /// Emergency latch is set.
    pub emergency: bool,
    /// Any overflow switch reports water.
    pub overflow: bool,
    /// Fresh moisture readings call for watering.
    pub should_water: bool,
    /// At least one pump is still commanded on.
    pub pumps_active: bool,
}

/// Action the caller must apply after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEffect {
    StartPumps,
    StopAllPumps,
    CycleComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Idle,
    Flooding { started_at: Instant, deadline: Instant },
    Draining { deadline: Instant },
}

/// Flood/drain cycle driver.
#[derive(Debug)]
pub struct WateringCycle {
    state: CycleState,
    flood_duration: Duration,
    drain_duration: Duration,
}

impl WateringCycle {
    pub fn new(flood_duration: Duration, drain_duration: Duration) -> Self {
        Self {
            state: CycleState::Idle,
            flood_duration,
            drain_duration,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        match self.state {
            CycleState::Idle => CyclePhase::Idle,
            CycleState::Flooding { .. } => CyclePhase::Flooding,
            CycleState::Draining { .. } => CyclePhase::Draining,
        }
    }

    /// Evaluate one tick, chaining through zero-length phases.
    pub fn tick(&mut self, input: &CycleInput) -> Vec<CycleEffect> {
        let mut effects = Vec::new();
        // One transition per state per tick; three states bounds the chain.
        for _ in 0..3 {
            if !self.step(input, &mut effects) {
                break;
            }
        }
        effects
    }

    /// Force the machine back to Idle without emitting effects. Used by
    /// emergency shutdown after pumps have already been forced off.
    pub fn reset(&mut self) {
        if self.state != CycleState::Idle {
            info!("watering cycle reset to idle");
        }
        self.state = CycleState::Idle;
    }

    fn step(&mut self, input: &CycleInput, effects: &mut Vec<CycleEffect>) -> bool {
        match self.state {
            CycleState::Idle => {
                let start = input.safety_ok
                    && !input.emergency
                    && !input.overflow
                    && input.should_water;
                if start {
                    info!(
                        "starting watering cycle, flood {:.1}s",
                        self.flood_duration.as_secs_f64()
                    );
                    self.state = CycleState::Flooding {
                        started_at: input.now,
                        deadline: input.now + self.flood_duration,
                    };
                    effects.push(CycleEffect::StartPumps);
                    return true;
                }
                false
            }
            CycleState::Flooding { started_at, deadline } => {
                if input.emergency {
                    effects.push(CycleEffect::StopAllPumps);
                    self.state = CycleState::Idle;
                    return true;
                }
                // A flood ends on schedule, on overflow, or when every pump
                // has already been forced off behind our back. The strict
                // `now > started_at` guard keeps a same-tick entry from
                // reading its own not-yet-applied StartPumps as pump death.
                let pumps_dead = input.now > started_at && !input.pumps_active;
                if input.overflow || input.now >= deadline || pumps_dead {
                    if input.overflow {
                        warn!("overflow during flood, draining early");
                    } else if pumps_dead {
                        warn!("all pumps stopped mid-flood, draining early");
                    }
                    effects.push(CycleEffect::StopAllPumps);
                    self.state = CycleState::Draining {
                        deadline: input.now + self.drain_duration,
                    };
                    return true;
                }
                false
            }
            CycleState::Draining { deadline } => {
                if input.emergency {
                    self.state = CycleState::Idle;
                    return true;
                }
                if input.now >= deadline {
                    info!("watering cycle complete");
                    effects.push(CycleEffect::CycleComplete);
                    self.state = CycleState::Idle;
                    return true;
                }
                false
            }
        }
    }
}

/// Whether fresh moisture readings call for watering: true iff at least one
/// reading is both younger than `cache_window` and strictly below
/// `threshold`. Stale or missing readings never count as dry.
pub fn should_water(
    batch: &MoistureBatch,
    threshold: f64,
    cache_window: Duration,
    now: Instant,
) -> bool {
    batch.readings.values().any(|reading| {
        now.duration_since(reading.taken_at) <= cache_window && reading.value < threshold
    })
}
