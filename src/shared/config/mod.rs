//! Application configuration module
//!
//! `AppConfig` holds every tunable of the sync core. It is read from an
//! optional TOML file and then overridden by environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default server URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "TRIPSYNC_CONFIG";
/// Environment override for the server URL
pub const SERVER_URL_ENV: &str = "TRIPSYNC_API_URL";
/// Environment override for the database path
pub const DB_PATH_ENV: &str = "TRIPSYNC_DB_PATH";

/// Advisory sampling intervals per motion class, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingIntervals {
    pub stationary_secs: u64,
    pub slow_moving_secs: u64,
    pub moving_secs: u64,
    pub high_speed_secs: u64,
}

impl Default for SamplingIntervals {
    fn default() -> Self {
        Self {
            stationary_secs: 60,
            slow_moving_secs: 20,
            moving_secs: 10,
            high_speed_secs: 5,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server URL
    pub server_url: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Upper bound for each phase of a sync cycle
    pub cycle_phase_timeout_secs: u64,
    /// Database file; `None` means the platform data directory
    pub db_path: Option<PathBuf>,
    /// Offline trip retention window
    pub retention_days: i64,
    /// Minimum displacement before a position sample is accepted, in meters
    pub min_displacement_m: f64,
    /// Motion-class sampling intervals
    pub sampling: SamplingIntervals,
    /// Push accepted samples to the telemetry endpoint
    pub telemetry_enabled: bool,
    /// Reachability probe period
    pub probe_interval_secs: u64,
    /// bcrypt cost for cached credentials
    pub credential_hash_cost: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout_secs: 30,
            cycle_phase_timeout_secs: 120,
            db_path: None,
            retention_days: 14,
            min_displacement_m: 50.0,
            sampling: SamplingIntervals::default(),
            telemetry_enabled: true,
            probe_interval_secs: 15,
            credential_hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Load from the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .ok()
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            self.server_url = url;
        }
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            self.db_path = Some(PathBuf::from(path));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if self.retention_days <= 0 {
            return Err(ConfigError::OutOfRange("retention_days"));
        }
        if !(self.min_displacement_m.is_finite() && self.min_displacement_m >= 0.0) {
            return Err(ConfigError::OutOfRange("min_displacement_m"));
        }
        if self.request_timeout_secs == 0 || self.cycle_phase_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange("timeout"));
        }
        if !(4..=31).contains(&self.credential_hash_cost) {
            return Err(ConfigError::OutOfRange("credential_hash_cost"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cycle_phase_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_phase_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tripsync").join("config.toml"))
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn cycle_phase_timeout_secs(mut self, secs: u64) -> Self {
        self.config.cycle_phase_timeout_secs = secs;
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = Some(path.into());
        self
    }

    pub fn retention_days(mut self, days: i64) -> Self {
        self.config.retention_days = days;
        self
    }

    pub fn min_displacement_m(mut self, meters: f64) -> Self {
        self.config.min_displacement_m = meters;
        self
    }

    pub fn telemetry_enabled(mut self, enabled: bool) -> Self {
        self.config.telemetry_enabled = enabled;
        self
    }

    pub fn credential_hash_cost(mut self, cost: u32) -> Self {
        self.config.credential_hash_cost = cost;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),
    #[error("failed to read {path:?}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
}
