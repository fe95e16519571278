//! Configuration System
//!
//! Loads configuration from TOML files with `BIOSENSE_*` environment variable
//! overrides. Every section is optional and falls back to its defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::api::ApiConfig;
use crate::classifier::{BaselineConfig, ClassifierConfig};
use crate::client::ClientConfig;
use crate::hub::HubConfig;
use crate::monitor::MonitorConfig;
use crate::sensor::SimulationConfig;
use crate::session::SessionLimits;
use crate::transport::TransportConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub classifier: ClassifierConfig,
    pub baseline: BaselineConfig,
    pub session: SessionLimits,
    pub hub: HubConfig,
    pub transport: TransportConfig,
    pub client: ClientConfig,
    pub simulation: SimulationSection,
    pub logging: LoggingConfig,
}

/// Server-side sample simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    /// Drive every session from a simulated source
    pub enabled: bool,
    #[serde(flatten)]
    pub source: SimulationConfig,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            enabled: true,
            source: SimulationConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// Log to this file instead of stderr
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_overrides_from(|key| std::env::var(key).ok());
        config
    }

    /// Load a file, then apply environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from the first default location that exists, or the environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("biosense").join("config.toml")),
            Some(PathBuf::from("/etc/biosense/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!(path = ?path, "Loaded config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "Failed to load config");
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply `BIOSENSE_*` overrides read through `lookup`
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("BIOSENSE_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("BIOSENSE_API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }

        if let Some(url) = lookup("BIOSENSE_SERVER_URL") {
            self.client.base_url = url;
        }
        if let Some(url) = lookup("BIOSENSE_STREAM_URL") {
            self.transport.url = url;
        }

        if let Some(enabled) = lookup("BIOSENSE_SIMULATION_ENABLED").and_then(|v| parse_bool(&v)) {
            self.simulation.enabled = enabled;
        }
        if let Some(n) = lookup("BIOSENSE_CALIBRATION_SAMPLES").and_then(|v| v.parse().ok()) {
            self.baseline.calibration_samples = n;
        }

        if let Some(level) = lookup("BIOSENSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("BIOSENSE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.classifier
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("classifier: {e}")))?;

        if !self.baseline.defaults().is_valid() {
            return Err(ConfigError::Invalid(
                "baseline: hrv and eda must be positive".to_string(),
            ));
        }
        if self.hub.max_listeners == 0 {
            return Err(ConfigError::Invalid(
                "hub: max_listeners must be at least 1".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging: unknown format '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// Pipeline policy for [`MonitorService`](crate::monitor::MonitorService)
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            classifier: self.classifier.clone(),
            baseline: self.baseline.clone(),
            limits: self.session.clone(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Biosense Configuration
#
# Environment variables override these settings:
# - BIOSENSE_API_HOST
# - BIOSENSE_API_PORT
# - BIOSENSE_SERVER_URL
# - BIOSENSE_STREAM_URL
# - BIOSENSE_SIMULATION_ENABLED
# - BIOSENSE_CALIBRATION_SAMPLES
# - BIOSENSE_LOG_LEVEL
# - BIOSENSE_LOG_FORMAT

[api]
host = "0.0.0.0"
port = 8082

# Maximum request body size (bytes)
max_body_size = 65536

# Allowed CORS origins; empty allows any origin
cors_origins = []

[classifier]
# Percent drop of HRV below baseline that alerts the channel
hrv_drop_pct = 25.0

# Percent rise of EDA above baseline that alerts the channel
eda_rise_pct = 40.0

# Readings below this quality are ignored
quality_floor = 30.0

# Rates of change (per second) that alert a channel on their own
hrv_rate_limit = 5.0
eda_rate_limit = 0.5

hrv_weight = 0.5
eda_weight = 0.5

# Cap of a single channel score
score_cap = 4.0

# Score breakpoints: qualifying (mild), moderate, severe
min_alert_score = 0.5
moderate_score = 1.5
severe_score = 2.5

# Consecutive samples needed to enter and to leave the anxious state
set_threshold = 3
clear_threshold = 3

[baseline]
# Defaults used when a session supplies no baseline
hrv = 50.0
eda = 2.0

# Average this many initial samples instead of using the defaults (0 disables)
calibration_samples = 0

[session]
max_sampling_rate = 50.0
max_simulation_duration = 86400.0
max_user_id_len = 128

[hub]
max_listeners = 1000

[transport]
url = "ws://127.0.0.1:8082/api/v1/ws"
connect_timeout_ms = 10000

[transport.reconnect]
enabled = true
base_delay_ms = 1000
max_delay_ms = 30000
max_attempts = 5

[client]
base_url = "http://127.0.0.1:8082"
request_timeout_ms = 10000

[simulation]
# Drive sessions from simulated HRV/EDA samples
enabled = true
resting_hrv = 50.0
resting_eda = 2.0
episode_hrv = 32.0
episode_eda = 3.2
episode_probability = 0.02
episode_secs = 20.0
dropout_probability = 0.03

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/biosense/biosense.log"
"#
    .to_string()
}
