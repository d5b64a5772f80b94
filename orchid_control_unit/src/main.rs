//! # OrchidBot Control Daemon
//!
//! Loads the controller configuration, wires the simulated hardware backends
//! to the control core, and runs the control loop plus safety monitor until
//! SIGINT. On shutdown every pump is forced off and the pin set released.

use clap::Parser;
use orchid_common::config::ControllerConfig;
use orchid_control_unit::controller::Controller;
use orchid_hal::{MoistureBank, OverflowBank, SimGpioDriver};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// OrchidBot — safety-gated irrigation controller
#[derive(Parser, Debug)]
#[command(name = "orchidd")]
#[command(version)]
#[command(about = "Flood/drain irrigation control daemon")]
struct Args {
    /// Path to the controller configuration TOML.
    #[arg(default_value = "config/orchid.toml")]
    config: PathBuf,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,

    /// Print the status snapshot as JSON on shutdown.
    #[arg(long)]
    status_on_exit: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("OrchidBot v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args).await {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("OrchidBot shutdown complete");
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ControllerConfig::load(&args.config)?;
    info!(
        "Config OK: {} pumps, flood={}s, drain={}s, watchdog={}s",
        config.pumps.pins.len(),
        config.watering.flood_duration,
        config.watering.drain_duration,
        config.safety.watchdog_timeout,
    );

    let gpio = Arc::new(SimGpioDriver::new());
    let moisture = Arc::new(MoistureBank::new(
        &config.sensors.moisture_addresses,
        Duration::from_secs_f64(config.sensors.cache_window),
    ));
    let overflow = Arc::new(OverflowBank::new(
        gpio.clone(),
        config.sensors.overflow_pins.clone(),
    ));

    let controller = Controller::new(config, gpio, moisture, overflow);
    controller.start()?;

    tokio::signal::ctrl_c().await?;
    info!("SIGINT received, shutting down");
    controller.stop();

    if args.status_on_exit {
        println!("{}", serde_json::to_string_pretty(&controller.status())?);
    }
    Ok(())
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
