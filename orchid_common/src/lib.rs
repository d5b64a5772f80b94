//! OrchidBot Common Library
//!
//! Shared types for the OrchidBot irrigation controller workspace.
//!
//! # Module Structure
//!
//! - [`config`] - TOML configuration loading and validation
//! - [`fault`] - Fault taxonomy (hardware, sensor, safety, config)
//! - [`hal`] - Hardware capability traits (pin driver, sensor sources)
//! - [`status`] - Serializable status snapshot types

pub mod config;
pub mod fault;
pub mod hal;
pub mod status;
