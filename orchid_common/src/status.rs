//! Serializable status snapshot types.
//!
//! Read-only projections of controller state for external consumers (CLI,
//! status endpoint). Snapshots are assembled under the owning component's
//! lock and handed out by value; nothing here mutates controller state.

use crate::fault::PinId;
use serde::Serialize;
use std::collections::HashMap;

/// Watering cycle phase, without the internal timing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Flooding,
    Draining,
}

/// One pump's externally-visible state.
#[derive(Debug, Clone, Serialize)]
pub struct PumpStatus {
    pub pin: PinId,
    pub active: bool,
    /// Seconds until the timeout registry would force this pump off.
    pub seconds_remaining: Option<f64>,
}

/// Safety monitor snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SafetySnapshot {
    pub monitoring: bool,
    pub emergency_stop: bool,
    /// Human-readable descriptions of currently-active violations.
    pub active_violations: Vec<String>,
    /// Seconds of watchdog budget left (0 when expired).
    pub watchdog_seconds_remaining: f64,
}

/// Complete controller status projection.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub running: bool,
    pub emergency_stop: bool,
    pub phase: CyclePhase,
    pub pumps: Vec<PumpStatus>,
    /// Latest sensor readings (moisture percentages and overflow flags as
    /// 0.0/1.0), keyed by sensor id.
    pub sensor_readings: HashMap<String, f64>,
    /// Completed flood/drain cycles since start.
    pub cycle_count: u64,
    /// Seconds since the last watering cycle began, if any.
    pub last_watering_secs_ago: Option<f64>,
    pub uptime_secs: f64,
    pub safety: SafetySnapshot,
}
