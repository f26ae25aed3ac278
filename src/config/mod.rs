//! Sensor Configuration Module
//!
//! Typed configuration loaded from TOML. Every key is enumerated with its
//! type and default; unknown keys and out-of-range values are rejected with
//! a descriptive error.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `OCCUPANCY_CONFIG` environment variable (path to TOML file)
//! 3. `sensor_config.toml` in the current working directory
//! 4. Built-in defaults
//!
//! The loaded value is passed explicitly to the pipelines; there is no
//! process-wide config singleton.

mod sensor_config;
pub mod defaults;
pub mod validation;

pub use sensor_config::*;
