//! Per-user baselines
//!
//! A baseline is fixed when a session starts: either supplied by the
//! caller, averaged from a calibration window, or taken from defaults.

use serde::{Deserialize, Serialize};

use crate::sensor::Sample;

/// Reference HRV/EDA values for a user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Baseline {
    /// Baseline HRV (ms)
    pub hrv: f64,
    /// Baseline EDA (µS)
    pub eda: f64,
}

impl Baseline {
    /// Create a baseline
    pub fn new(hrv: f64, eda: f64) -> Self {
        Self { hrv, eda }
    }

    /// Both values finite and positive
    pub fn is_valid(&self) -> bool {
        self.hrv.is_finite() && self.hrv > 0.0 && self.eda.is_finite() && self.eda > 0.0
    }

    /// Average the trusted readings of a calibration window.
    ///
    /// A channel without any reading at or above `quality_floor` keeps the
    /// `fallback` value.
    pub fn calibrate(samples: &[Sample], quality_floor: f64, fallback: Baseline) -> Baseline {
        let mean = |values: Vec<f64>| -> Option<f64> {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        };

        let sanitized: Vec<Sample> = samples.iter().map(Sample::sanitized).collect();
        let hrv = sanitized
            .iter()
            .filter(|s| s.hrv.is_trusted(quality_floor) && s.hrv.value > 0.0)
            .map(|s| s.hrv.value)
            .collect();
        let eda = sanitized
            .iter()
            .filter(|s| s.eda.is_trusted(quality_floor) && s.eda.value > 0.0)
            .map(|s| s.eda.value)
            .collect();

        Baseline {
            hrv: mean(hrv).unwrap_or(fallback.hrv),
            eda: mean(eda).unwrap_or(fallback.eda),
        }
    }
}

/// Baseline defaults and calibration window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Default HRV baseline (ms)
    pub hrv: f64,
    /// Default EDA baseline (µS)
    pub eda: f64,
    /// Samples averaged at session start; 0 uses the defaults directly
    pub calibration_samples: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            hrv: 50.0,
            eda: 2.0,
            calibration_samples: 0,
        }
    }
}

impl BaselineConfig {
    /// The default baseline
    pub fn defaults(&self) -> Baseline {
        Baseline::new(self.hrv, self.eda)
    }
}
