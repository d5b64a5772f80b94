//! OrchidBot Hardware Abstraction
//!
//! Concrete implementations of the capability traits in
//! [`orchid_common::hal`]:
//!
//! - [`gpio::SimGpioDriver`] - simulated digital pin driver for development
//!   and host-side testing, with inspectable pin state and fault injection
//! - [`moisture::MoistureBank`] - calibrated moisture sensor bank with read
//!   caching and per-sensor failure isolation
//! - [`overflow::OverflowBank`] - float-switch overflow bank with fail-safe
//!   read semantics
//!
//! A real-hardware GPIO backend plugs in behind the same `PinDriver` trait;
//! everything above the trait boundary is backend-agnostic.

pub mod gpio;
pub mod moisture;
pub mod overflow;

pub use gpio::SimGpioDriver;
pub use moisture::{Calibration, MoistureBank};
pub use overflow::OverflowBank;
