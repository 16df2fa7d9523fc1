//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ReceiverError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Radio link and reconnect configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_target_name")]
    pub target_name: String,

    #[serde(default = "default_service_uuid")]
    pub service_uuid: u16,

    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: u16,

    #[serde(default = "default_scan_window_ms")]
    pub scan_window_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default)]
    pub reset_calibration_on_disconnect: bool,
}

/// Live display window configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WindowConfig {
    #[serde(default = "default_window_duration_s")]
    pub duration_s: f64,

    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

/// Session log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

/// Simulated transmitter configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    #[serde(default = "default_baseline_v")]
    pub baseline_v: f64,

    #[serde(default = "default_reference_v")]
    pub reference_v: f64,

    /// Drop the link after this many frames (0 = never)
    #[serde(default)]
    pub frames_per_connection: u64,
}

// Default value functions
fn default_target_name() -> String { "TRANSMITTER".to_string() }
fn default_service_uuid() -> u16 { 0x181A }
fn default_characteristic_uuid() -> u16 { 0x2A6E }
fn default_scan_window_ms() -> u64 { 5000 }
fn default_connect_timeout_ms() -> u64 { 10000 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_window_duration_s() -> f64 { 10.0 }
fn default_max_points() -> usize { 100 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_file_prefix() -> String { "session".to_string() }

fn default_frame_interval_ms() -> u64 { 500 }
fn default_baseline_v() -> f64 { 1.0 }
fn default_reference_v() -> f64 { 0.5 }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            target_name: default_target_name(),
            service_uuid: default_service_uuid(),
            characteristic_uuid: default_characteristic_uuid(),
            scan_window_ms: default_scan_window_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reset_calibration_on_disconnect: false,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration_s: default_window_duration_s(),
            max_points: default_max_points(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            baseline_v: default_baseline_v(),
            reference_v: default_reference_v(),
            frames_per_connection: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            window: WindowConfig::default(),
            session: SessionConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Length of one scan burst
    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    /// Upper bound on connect plus subscribe
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Pause before scanning again after a failure
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl WindowConfig {
    /// Trailing duration of the display window
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_s)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_receiver::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.link.target_name.is_empty() {
            return Err(invalid("target_name cannot be empty"));
        }

        if self.link.service_uuid == 0 || self.link.characteristic_uuid == 0 {
            return Err(invalid("service_uuid and characteristic_uuid must be non-zero"));
        }

        // Validate timing fields
        for (name, value) in [
            ("scan_window_ms", self.link.scan_window_ms),
            ("connect_timeout_ms", self.link.connect_timeout_ms),
            ("reconnect_interval_ms", self.link.reconnect_interval_ms),
            ("frame_interval_ms", self.simulator.frame_interval_ms),
        ] {
            if value == 0 || value > 60000 {
                return Err(invalid(format!("{} must be between 1 and 60000", name)));
            }
        }

        if !(self.window.duration_s > 0.0 && self.window.duration_s <= 3600.0) {
            return Err(invalid("window duration_s must be greater than 0 and at most 3600"));
        }

        if self.window.max_points == 0 {
            return Err(invalid("max_points must be greater than 0"));
        }

        if self.session.log_dir.is_empty() {
            return Err(invalid("session log_dir cannot be empty"));
        }

        if self.session.file_prefix.is_empty()
            || self.session.file_prefix.contains(['/', '\\'])
        {
            return Err(invalid("file_prefix must be non-empty and contain no path separators"));
        }

        if !self.simulator.baseline_v.is_finite() || !self.simulator.reference_v.is_finite() {
            return Err(invalid("simulator voltages must be finite"));
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> ReceiverError {
    ReceiverError::Config(toml::de::Error::custom(msg))
}
