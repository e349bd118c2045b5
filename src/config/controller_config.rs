//! Controller Configuration - all control parameters as operator-tunable TOML values
//!
//! Every struct implements `Default`, ensuring the controller runs with
//! sensible production values when no config file is present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a controller deployment.
///
/// Load with `ControllerConfig::load()` which searches:
/// 1. `$LINEPACE_CONFIG` env var
/// 2. `./linepace.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Cycle-time bus feed settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Control pipeline tuning
    #[serde(default)]
    pub control: ControlSettings,

    /// Downstream result callback settings
    #[serde(default)]
    pub callback: CallbackConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            bus: BusConfig::default(),
            control: ControlSettings::default(),
            callback: CallbackConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration using the standard search order:
    /// 1. `$LINEPACE_CONFIG` environment variable
    /// 2. `./linepace.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("LINEPACE_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded controller config from LINEPACE_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from LINEPACE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "LINEPACE_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./linepace.toml
        let local = PathBuf::from("linepace.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded controller config from ./linepace.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./linepace.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No linepace.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    ///
    /// Called automatically by `load_from_file`; call it explicitly after
    /// constructing a config by hand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.control;
        if c.speed_min > c.speed_max {
            return Err(ConfigError::Invalid(format!(
                "control.speed_min ({}) must not exceed control.speed_max ({})",
                c.speed_min, c.speed_max
            )));
        }
        if c.voltage_min > c.voltage_max {
            return Err(ConfigError::Invalid(format!(
                "control.voltage_min ({}) must not exceed control.voltage_max ({})",
                c.voltage_min, c.voltage_max
            )));
        }
        if c.ct_filter_window_samples == 0 {
            return Err(ConfigError::Invalid(
                "control.ct_filter_window_samples must be at least 1".to_string(),
            ));
        }
        if !c.default_speed.is_finite() || !c.ct_to_speed_factor.is_finite() {
            return Err(ConfigError::Invalid(
                "control.default_speed and control.ct_to_speed_factor must be finite".to_string(),
            ));
        }
        if self.callback.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "callback.max_retries must be at least 1".to_string(),
            ));
        }
        if self.callback.queue_capacity == 0 || self.callback.workers == 0 {
            return Err(ConfigError::Invalid(
                "callback.queue_capacity and callback.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the dashboard API
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

fn default_server_addr() -> String {
    "0.0.0.0:9002".to_string()
}

/// Cycle-time bus feed settings.
///
/// The feed is a TCP stream of line-delimited JSON messages published by the
/// cycle-time calculation side (see `ct-simulation`). The broker/relay itself
/// is external; this is the consuming client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Whether to connect to the bus at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bus feed address, `host:port`
    #[serde(default = "default_bus_addr")]
    pub addr: String,
    /// Per-line read timeout before a reconnect is attempted (seconds)
    #[serde(default = "default_bus_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: default_bus_addr(),
            read_timeout_secs: default_bus_read_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bus_addr() -> String {
    "localhost:9001".to_string()
}

fn default_bus_read_timeout() -> u64 {
    120
}

/// Control pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSettings {
    /// Lower clamp for line speed (units/min)
    #[serde(default = "default_speed_min")]
    pub speed_min: f64,
    /// Upper clamp for line speed (units/min)
    #[serde(default = "default_speed_max")]
    pub speed_max: f64,
    /// Speed used when the filtered cycle time is non-positive
    #[serde(default = "default_default_speed")]
    pub default_speed: f64,
    /// Lower bound of the analog output range (V)
    #[serde(default)]
    pub voltage_min: f64,
    /// Upper bound of the analog output range (V)
    #[serde(default = "default_voltage_max")]
    pub voltage_max: f64,
    /// Maximum output slew rate (V/s); non-positive disables ramping entirely
    #[serde(default = "default_ramp_rate")]
    pub ramp_rate_v_per_sec: f64,
    /// Moving-average window size for cycle-time smoothing (samples, >= 1)
    #[serde(default = "default_filter_window")]
    pub ct_filter_window_samples: usize,
    /// Inverse-proportionality factor: `speed = factor / ct_minutes`
    #[serde(default = "default_ct_factor")]
    pub ct_to_speed_factor: f64,
    /// Chain-state snapshots older than this are flagged stale (seconds)
    #[serde(default = "default_max_chain_age")]
    pub max_chain_age_secs: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            speed_min: default_speed_min(),
            speed_max: default_speed_max(),
            default_speed: default_default_speed(),
            voltage_min: 0.0,
            voltage_max: default_voltage_max(),
            ramp_rate_v_per_sec: default_ramp_rate(),
            ct_filter_window_samples: default_filter_window(),
            ct_to_speed_factor: default_ct_factor(),
            max_chain_age_secs: default_max_chain_age(),
        }
    }
}

fn default_speed_min() -> f64 {
    20.0
}

fn default_speed_max() -> f64 {
    80.0
}

fn default_default_speed() -> f64 {
    50.0
}

fn default_voltage_max() -> f64 {
    10.0
}

fn default_ramp_rate() -> f64 {
    1.0
}

fn default_filter_window() -> usize {
    5
}

fn default_ct_factor() -> f64 {
    1.0
}

fn default_max_chain_age() -> u64 {
    30
}

/// Downstream result callback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Whether control results are forwarded at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Callback endpoint URL
    #[serde(default = "default_callback_url")]
    pub url: String,
    /// Per-attempt HTTP timeout (seconds)
    #[serde(default = "default_callback_timeout")]
    pub timeout_secs: u64,
    /// Total delivery attempts per result (>= 1)
    #[serde(default = "default_callback_retries")]
    pub max_retries: u32,
    /// Bounded dispatch queue capacity; full queue drops results
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of delivery workers draining the queue
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_callback_url(),
            timeout_secs: default_callback_timeout(),
            max_retries: default_callback_retries(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
        }
    }
}

fn default_callback_url() -> String {
    "http://localhost:5000/api/simulation-results".to_string()
}

fn default_callback_timeout() -> u64 {
    5
}

fn default_callback_retries() -> u32 {
    3
}

fn default_queue_capacity() -> usize {
    256
}

fn default_workers() -> usize {
    2
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the control log database
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl StorageConfig {
    /// Path of the control log database inside the data directory.
    pub fn control_log_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("control_log.db")
    }
}

// ============================================================================
// Tests
// ============================================================================
