//! Analysis output types
//!
//! One [`AnxietyAnalysis`] is produced per incoming sample. It is sent to
//! listeners as-is and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-channel verdict
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MetricStatus {
    #[serde(rename = "ALERT")]
    Alert,
    #[serde(rename = "normal")]
    Normal,
}

/// Analysis of a single channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricAnalysis {
    /// The sanitized reading value
    pub value: f64,
    /// Deviation score, 1.0 at the alert threshold
    pub score: f64,
    /// Channel verdict
    pub status: MetricStatus,
}

impl MetricAnalysis {
    /// Whether the channel is ALERT
    pub fn is_alert(&self) -> bool {
        self.status == MetricStatus::Alert
    }
}

/// Per-second change relative to the previous sample
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RateOfChange {
    /// HRV change (ms/s)
    pub hrv: f64,
    /// EDA change (µS/s)
    pub eda: f64,
}

/// Channel analyses of one sample
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    pub hrv: MetricAnalysis,
    pub eda: MetricAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_of_change: Option<RateOfChange>,
}

/// Graded severity of an anxious state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Mild => write!(f, "mild"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::Severe => write!(f, "severe"),
        }
    }
}

/// What contributed to an alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// HRV dropped past the threshold
    HrvDrop,
    /// EDA rose past the threshold
    EdaRise,
    /// HRV fell faster than the rate limit
    HrvRapidChange,
    /// EDA rose faster than the rate limit
    EdaRapidChange,
    /// At least one channel was below the quality floor
    LowSignalQuality,
}

/// Graded anxiety assessment for one sample
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnxietyAnalysis {
    pub user_id: String,
    pub is_anxious: bool,
    /// Confidence in the verdict, in [0, 1]
    pub confidence: f64,
    /// Timestamp of the analysed sample
    pub timestamp: DateTime<Utc>,
    /// Present only while `is_anxious`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub anxiety_score: f64,
    /// Consecutive qualifying samples including this one
    pub consecutive_readings: u32,
    pub metrics: AnalysisMetrics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
}
