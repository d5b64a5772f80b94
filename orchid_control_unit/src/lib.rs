//! # OrchidBot Control Unit Library
//!
//! Safety-gated control core for a flood/drain irrigation system. Reads
//! moisture and overflow sensors, decides when to water, and actuates pumps
//! through time-bounded, fail-safe cycles.
//!
//! ## Architecture
//!
//! Three independent schedules share one mutual-exclusion domain per pin set:
//!
//! 1. **Control loop** ([`controller`]) — cooperative tick: watchdog reset,
//!    sensor ingest, cycle state machine, pump reconciliation.
//! 2. **Safety monitor** ([`safety`]) — background task evaluating global
//!    safety predicates at its own cadence; owns forced shutdown.
//! 3. **Deferred force-off timers** ([`pumps`]) — one-shot per activation,
//!    epoch-guarded, so a hung control loop still cannot leave a pump on.
//!
//! Pump bookkeeping and the physical pin write always change together inside
//! the lock; a force-off from any schedule is observable by the other two on
//! their next action. Actuators fail to OFF under any fault.

#![deny(clippy::disallowed_types)]

pub mod controller;
pub mod cycle;
pub mod pumps;
pub mod registry;
pub mod safety;
