//! Classifier policy constants
//!
//! All thresholds, weights and breakpoints are fixed configuration; nothing
//! here is learned at runtime.

use serde::{Deserialize, Serialize};

/// Thresholds, weights and hysteresis settings for the classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// HRV drop below baseline (percent) that marks the channel ALERT
    pub hrv_drop_pct: f64,
    /// EDA rise above baseline (percent) that marks the channel ALERT
    pub eda_rise_pct: f64,
    /// Channels with lower quality never contribute to an alert
    pub quality_floor: f64,
    /// HRV fall rate (ms per second) that marks the channel ALERT
    pub hrv_rate_limit: f64,
    /// EDA rise rate (µS per second) that marks the channel ALERT
    pub eda_rate_limit: f64,
    /// Weight of the HRV score in the anxiety score
    pub hrv_weight: f64,
    /// Weight of the EDA score in the anxiety score
    pub eda_weight: f64,
    /// Upper bound of a single channel score
    pub score_cap: f64,
    /// Minimum anxiety score for a sample to qualify; also the mild breakpoint
    pub min_alert_score: f64,
    /// Score at which severity becomes moderate
    pub moderate_score: f64,
    /// Score at which severity becomes severe
    pub severe_score: f64,
    /// Consecutive qualifying samples before `is_anxious` turns on
    pub set_threshold: u32,
    /// Consecutive normal samples before `is_anxious` turns off
    pub clear_threshold: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            hrv_drop_pct: 25.0,
            eda_rise_pct: 40.0,
            quality_floor: 30.0,
            hrv_rate_limit: 5.0,
            eda_rate_limit: 0.5,
            hrv_weight: 0.5,
            eda_weight: 0.5,
            score_cap: 4.0,
            min_alert_score: 0.5,
            moderate_score: 1.5,
            severe_score: 2.5,
            set_threshold: 3,
            clear_threshold: 3,
        }
    }
}

impl ClassifierConfig {
    /// Check that the policy is internally consistent
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("hrv_drop_pct", self.hrv_drop_pct),
            ("eda_rise_pct", self.eda_rise_pct),
            ("hrv_rate_limit", self.hrv_rate_limit),
            ("eda_rate_limit", self.eda_rate_limit),
            ("score_cap", self.score_cap),
            ("min_alert_score", self.min_alert_score),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{} must be a positive number", name));
            }
        }

        if self.hrv_weight < 0.0 || self.eda_weight < 0.0 {
            return Err("channel weights must not be negative".to_string());
        }
        if self.hrv_weight + self.eda_weight <= 0.0 {
            return Err("at least one channel weight must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.quality_floor) {
            return Err("quality_floor must be within 0-100".to_string());
        }
        if !(self.min_alert_score <= self.moderate_score && self.moderate_score <= self.severe_score) {
            return Err("severity breakpoints must be ascending".to_string());
        }
        if self.set_threshold == 0 || self.clear_threshold == 0 {
            return Err("hysteresis thresholds must be at least 1".to_string());
        }

        Ok(())
    }
}
