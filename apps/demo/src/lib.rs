//! # Herald demo
//!
//! Wires a sensor dashboard through a [`herald_bus::EventBus`] configured from
//! `herald.toml` and `HERALD__*` environment variables.

pub mod config;
pub mod logging;
pub mod scenario;

pub use config::{ConfigError, DemoConfig, load_config};
pub use logging::LoggingError;
