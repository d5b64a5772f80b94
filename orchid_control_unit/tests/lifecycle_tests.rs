//! End-to-end controller lifecycle tests.
//!
//! Run the full stack (controller loop + safety monitor + simulated
//! hardware) with short real durations and observe pin levels and status
//! snapshots from outside.

use orchid_common::config::ControllerConfig;
use orchid_common::status::CyclePhase;
use orchid_control_unit::controller::Controller;
use orchid_hal::moisture::sensor_id;
use orchid_hal::{MoistureBank, OverflowBank, SimGpioDriver};
use std::sync::Arc;
use std::time::Duration;

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_config() -> ControllerConfig {
    let mut cfg = ControllerConfig::default();
    cfg.pumps.pins = vec![18, 19];
    cfg.pumps.timeout = 2.0;
    cfg.sensors.moisture_addresses = vec![0x20, 0x21];
    cfg.sensors.overflow_pins = vec![21, 22];
    cfg.watering.flood_duration = 0.05;
    cfg.watering.drain_duration = 0.05;
    cfg.control.tick_interval = 0.01;
    cfg.safety.check_interval = 0.01;
    cfg
}

fn build(
    cfg: ControllerConfig,
) -> (Arc<SimGpioDriver>, Arc<MoistureBank>, Arc<Controller>) {
    let gpio = Arc::new(SimGpioDriver::new());
    let moisture = Arc::new(MoistureBank::new(
        &cfg.sensors.moisture_addresses,
        Duration::from_secs_f64(cfg.sensors.cache_window),
    ));
    let overflow = Arc::new(OverflowBank::new(
        gpio.clone(),
        cfg.sensors.overflow_pins.clone(),
    ));
    let controller = Controller::new(cfg, gpio.clone(), moisture.clone(), overflow);
    (gpio, moisture, controller)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn dry_soil_drives_complete_cycles() {
    let (_gpio, moisture, controller) = build(fast_config());
    moisture.set_percent(&sensor_id(0x20), 20.0);
    moisture.set_percent(&sensor_id(0x21), 60.0);

    controller.start().expect("start");
    tokio::time::sleep(Duration::from_millis(400)).await;

    let status = controller.status();
    assert!(status.running);
    assert!(status.cycle_count >= 1, "no cycle completed");
    assert!(status.last_watering_secs_ago.is_some());
    assert!(!status.emergency_stop);

    controller.stop();
}

#[tokio::test]
async fn wet_soil_never_waters() {
    let (gpio, moisture, controller) = build(fast_config());
    moisture.set_percent(&sensor_id(0x20), 80.0);
    moisture.set_percent(&sensor_id(0x21), 75.0);

    controller.start().expect("start");
    tokio::time::sleep(Duration::from_millis(150)).await;

    let status = controller.status();
    assert_eq!(status.phase, CyclePhase::Idle);
    assert_eq!(status.cycle_count, 0);
    assert_eq!(gpio.pin_state(18), Some(false));

    controller.stop();
}

#[tokio::test]
async fn overflow_aborts_a_running_flood() {
    let mut cfg = fast_config();
    // Long flood so the overflow, not the schedule, ends it.
    cfg.watering.flood_duration = 10.0;
    cfg.watering.drain_duration = 10.0;
    let (gpio, moisture, controller) = build(cfg);
    moisture.set_percent(&sensor_id(0x20), 20.0);

    controller.start().expect("start");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.status().phase, CyclePhase::Flooding);
    assert_eq!(gpio.pin_state(18), Some(true));

    gpio.drive_input(21, false);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = controller.status();
    assert_eq!(status.phase, CyclePhase::Draining);
    assert_eq!(gpio.pin_state(18), Some(false));
    assert_eq!(gpio.pin_state(19), Some(false));

    controller.stop();
}

#[tokio::test]
async fn flood_outlasts_the_default_pump_timeout() {
    let mut cfg = fast_config();
    // The per-activation default cap is far shorter than the flood; a
    // scheduled flood run is bounded by the flood itself, so nothing may
    // force the pumps off early or raise timeout violations.
    cfg.pumps.timeout = 0.05;
    cfg.watering.flood_duration = 5.0;
    cfg.watering.drain_duration = 5.0;
    let (gpio, moisture, controller) = build(cfg);
    moisture.set_percent(&sensor_id(0x20), 20.0);

    controller.start().expect("start");
    tokio::time::sleep(Duration::from_millis(400)).await;

    let status = controller.status();
    assert_eq!(status.phase, CyclePhase::Flooding);
    assert_eq!(gpio.pin_state(18), Some(true));
    assert_eq!(gpio.pin_state(19), Some(true));
    assert!(
        status.safety.active_violations.is_empty(),
        "unexpected violations: {:?}",
        status.safety.active_violations
    );

    controller.stop();
}

#[tokio::test]
async fn emergency_input_stops_a_running_cycle() {
    let mut cfg = fast_config();
    cfg.watering.flood_duration = 10.0;
    let (gpio, moisture, controller) = build(cfg);
    moisture.set_percent(&sensor_id(0x20), 20.0);

    controller.start().expect("start");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gpio.pin_state(18), Some(true));

    gpio.drive_input(25, false);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = controller.status();
    assert!(status.emergency_stop);
    assert_eq!(gpio.pin_state(18), Some(false));

    // Release and reset: the system recovers and can water again.
    gpio.drive_input(25, true);
    controller.reset_emergency().expect("reset");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!controller.status().emergency_stop);
    assert_eq!(controller.status().phase, CyclePhase::Flooding);

    controller.stop();
}

#[tokio::test]
async fn dead_moisture_sensor_never_triggers_watering() {
    let (gpio, moisture, controller) = build(fast_config());
    // The dry channel is dead from the start: it never produces a reading,
    // only faults. Absence of data must read as "do not water", not "dry".
    moisture.set_percent(&sensor_id(0x20), 10.0);
    moisture.set_failed(&sensor_id(0x20), true);
    moisture.set_percent(&sensor_id(0x21), 70.0);

    controller.start().expect("start");
    tokio::time::sleep(Duration::from_millis(150)).await;

    let status = controller.status();
    assert_eq!(status.phase, CyclePhase::Idle);
    assert_eq!(status.cycle_count, 0);
    assert_eq!(gpio.pin_state(18), Some(false));

    controller.stop();
}

#[tokio::test]
async fn status_snapshot_serializes_for_operators() {
    let (_gpio, moisture, controller) = build(fast_config());
    moisture.set_percent(&sensor_id(0x20), 55.0);

    controller.start().expect("start");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = controller.status();
    let json = serde_json::to_value(&status).expect("serialize");
    assert_eq!(json["running"], true);
    assert!(json["pumps"].as_array().expect("pumps").len() == 2);
    assert!(json["safety"]["monitoring"] == true);
    assert!(json["uptime_secs"].as_f64().expect("uptime") >= 0.0);
    assert!(json["sensor_readings"].is_object());
    // Overflow switches ride along as 0.0/1.0 flags.
    assert_eq!(json["sensor_readings"]["overflow_21"], 0.0);
    assert_eq!(json["sensor_readings"]["overflow_22"], 0.0);

    controller.stop();
}
