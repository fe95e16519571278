//! Session configuration and per-user state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

use super::error::{SessionError, SessionResult};
use crate::classifier::{Baseline, Classification, HysteresisState};
use crate::sensor::Sample;

/// Configuration supplied when a session starts; immutable afterwards
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub user_id: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Samples per second
    pub sampling_rate: f64,
    /// Seconds of simulated data; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_duration: Option<f64>,
    /// Explicit baseline, overriding calibration and defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<Baseline>,
}

fn default_active() -> bool {
    true
}

impl SessionConfig {
    /// Config with only the required fields
    pub fn new(user_id: impl Into<String>, sampling_rate: f64) -> Self {
        Self {
            user_id: user_id.into(),
            is_active: true,
            sampling_rate,
            simulation_duration: None,
            baseline: None,
        }
    }

    /// Builder method: bound the simulation
    pub fn simulation_duration(mut self, seconds: f64) -> Self {
        self.simulation_duration = Some(seconds);
        self
    }

    /// Builder method: supply a baseline
    pub fn baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Check the config against `limits` without touching any state
    pub fn validate(&self, limits: &SessionLimits) -> SessionResult<()> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(SessionError::Validation("userId is required".to_string()));
        }
        if user_id.len() > limits.max_user_id_len {
            return Err(SessionError::Validation(format!(
                "userId exceeds maximum length of {} characters",
                limits.max_user_id_len
            )));
        }
        if !self.is_active {
            return Err(SessionError::Validation(
                "cannot start a session with isActive=false".to_string(),
            ));
        }
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(SessionError::Validation(
                "samplingRate must be a positive number".to_string(),
            ));
        }
        if self.sampling_rate > limits.max_sampling_rate {
            return Err(SessionError::Validation(format!(
                "samplingRate exceeds maximum of {} samples per second",
                limits.max_sampling_rate
            )));
        }
        if let Some(duration) = self.simulation_duration {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(SessionError::Validation(
                    "simulationDuration must be a positive number of seconds".to_string(),
                ));
            }
            if duration > limits.max_simulation_duration {
                return Err(SessionError::Validation(format!(
                    "simulationDuration exceeds maximum of {} seconds",
                    limits.max_simulation_duration
                )));
            }
        }
        if let Some(baseline) = &self.baseline {
            if !baseline.is_valid() {
                return Err(SessionError::Validation(
                    "baseline values must be positive numbers".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Bounds applied to incoming session configs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Maximum samples per second
    pub max_sampling_rate: f64,
    /// Maximum simulation length in seconds
    pub max_simulation_duration: f64,
    /// Maximum user id length
    pub max_user_id_len: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sampling_rate: 50.0,
            max_simulation_duration: 24.0 * 60.0 * 60.0,
            max_user_id_len: 128,
        }
    }
}

/// Mutable state of one active session
#[derive(Debug)]
pub struct UserState {
    pub user_id: String,
    pub config: SessionConfig,
    pub is_active: bool,
    /// Fixed at session start
    pub baseline: Baseline,
    pub last_reading: Option<Sample>,
    pub hysteresis: HysteresisState,
    pub samples_processed: u64,
    pub started_at: DateTime<Utc>,
    /// Handle of the task producing samples for this session
    pub driver: Option<AbortHandle>,
}

impl UserState {
    /// Fresh state with zeroed counters
    pub fn new(config: SessionConfig, baseline: Baseline) -> Self {
        Self {
            user_id: config.user_id.clone(),
            config,
            is_active: true,
            baseline,
            last_reading: None,
            hysteresis: HysteresisState::default(),
            samples_processed: 0,
            started_at: Utc::now(),
            driver: None,
        }
    }

    /// Store the outcome of classifying `sample`
    pub fn record(&mut self, sample: Sample, classification: &Classification) {
        self.hysteresis = classification.hysteresis;
        self.last_reading = Some(sample);
        self.samples_processed += 1;
    }

    /// Consecutive qualifying samples so far
    pub fn consecutive_anxious_readings(&self) -> u32 {
        self.hysteresis.consecutive_anxious
    }

    /// Read-only copy for callers outside the pipeline
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.user_id.clone(),
            is_active: self.is_active,
            baseline_hrv: self.baseline.hrv,
            baseline_eda: self.baseline.eda,
            last_reading: self.last_reading.clone(),
            consecutive_anxious_readings: self.hysteresis.consecutive_anxious,
            is_anxious: self.hysteresis.is_anxious,
            sampling_rate: self.config.sampling_rate,
            simulation_duration: self.config.simulation_duration,
            samples_processed: self.samples_processed,
            started_at: self.started_at,
        }
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub user_id: String,
    pub is_active: bool,
    #[serde(rename = "baselineHRV")]
    pub baseline_hrv: f64,
    #[serde(rename = "baselineEDA")]
    pub baseline_eda: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reading: Option<Sample>,
    pub consecutive_anxious_readings: u32,
    pub is_anxious: bool,
    pub sampling_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_duration: Option<f64>,
    pub samples_processed: u64,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = SessionConfig::new("user-1", 1.0).simulation_duration(60.0);
        assert!(config.validate(&SessionLimits::default()).is_ok());
    }

    #[test]
    fn test_missing_user_id_rejected() {
        let config = SessionConfig::new("  ", 1.0);
        assert!(matches!(
            config.validate(&SessionLimits::default()),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_sampling_rate_rejected() {
        let limits = SessionLimits::default();
        assert!(SessionConfig::new("u", 0.0).validate(&limits).is_err());
        assert!(SessionConfig::new("u", f64::NAN).validate(&limits).is_err());
        assert!(SessionConfig::new("u", 500.0).validate(&limits).is_err());
    }

    #[test]
    fn test_bad_duration_and_baseline_rejected() {
        let limits = SessionLimits::default();
        assert!(SessionConfig::new("u", 1.0)
            .simulation_duration(-5.0)
            .validate(&limits)
            .is_err());
        assert!(SessionConfig::new("u", 1.0)
            .baseline(Baseline::new(0.0, 2.0))
            .validate(&limits)
            .is_err());
    }

    #[test]
    fn test_inactive_config_rejected() {
        let mut config = SessionConfig::new("u", 1.0);
        config.is_active = false;
        assert!(config.validate(&SessionLimits::default()).is_err());
    }

    #[test]
    fn test_deserialize_control_plane_body() {
        let json = r#"{"userId": "user-1", "samplingRate": 2, "simulationDuration": 30}"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.user_id, "user-1");
        assert!(config.is_active);
        assert_eq!(config.sampling_rate, 2.0);
        assert_eq!(config.simulation_duration, Some(30.0));
    }

    #[test]
    fn test_snapshot_field_names() {
        let state = UserState::new(SessionConfig::new("user-1", 1.0), Baseline::new(50.0, 2.0));
        let json = serde_json::to_string(&state.snapshot()).unwrap();
        assert!(json.contains("\"baselineHRV\":50.0"));
        assert!(json.contains("\"baselineEDA\":2.0"));
        assert!(json.contains("\"consecutiveAnxiousReadings\":0"));
        assert!(!json.contains("lastReading"));
    }
}
