//! Controller Configuration Module
//!
//! Provides deployment configuration loaded from TOML files, replacing
//! hardcoded control parameters with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `LINEPACE_CONFIG` environment variable (path to TOML file)
//! 2. `linepace.toml` in the current working directory
//! 3. Built-in defaults

mod controller_config;
pub mod defaults;

pub use controller_config::*;
