//! Sample classification
//!
//! [`Classifier::classify`] is a pure function of the sample, the session's
//! baseline, the previous sample and the prior hysteresis state. It returns
//! the analysis together with the next hysteresis state; storing that state
//! is the session registry's job.

use serde::{Deserialize, Serialize};

use super::analysis::{
    AnalysisMetrics, AnxietyAnalysis, MetricAnalysis, MetricStatus, RateOfChange, Severity,
    Trigger,
};
use super::baseline::Baseline;
use super::policy::ClassifierConfig;
use crate::sensor::{ChannelReading, Sample};

/// Hysteresis latch carried between samples of one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HysteresisState {
    /// Latched anxious state
    pub is_anxious: bool,
    /// Consecutive qualifying samples
    pub consecutive_anxious: u32,
    /// Consecutive non-qualifying samples
    pub consecutive_normal: u32,
}

impl HysteresisState {
    /// Advance the latch by one sample
    pub fn advance(self, qualifies: bool, set_threshold: u32, clear_threshold: u32) -> Self {
        if qualifies {
            let consecutive_anxious = self.consecutive_anxious.saturating_add(1);
            Self {
                is_anxious: self.is_anxious || consecutive_anxious >= set_threshold,
                consecutive_anxious,
                consecutive_normal: 0,
            }
        } else {
            let consecutive_normal = self.consecutive_normal.saturating_add(1);
            Self {
                is_anxious: self.is_anxious && consecutive_normal < clear_threshold,
                consecutive_anxious: 0,
                consecutive_normal,
            }
        }
    }
}

/// Result of classifying one sample
#[derive(Debug, Clone)]
pub struct Classification {
    /// The emitted analysis
    pub analysis: AnxietyAnalysis,
    /// State to carry into the next sample
    pub hysteresis: HysteresisState,
}

/// Which way a channel moves under stress
#[derive(Debug, Clone, Copy)]
enum Direction {
    Falling,
    Rising,
}

struct ChannelEval {
    analysis: MetricAnalysis,
    quality: f64,
    trusted: bool,
    deviation_alert: bool,
    rate_alert: bool,
}

/// Stateless anxiety classifier
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    /// Create a classifier with the given policy
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// The policy in use
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify one sample
    pub fn classify(
        &self,
        sample: &Sample,
        baseline: &Baseline,
        previous: Option<&Sample>,
        prior: HysteresisState,
    ) -> Classification {
        let config = &self.config;
        let sample = sample.sanitized();
        let previous = previous.map(Sample::sanitized);

        let rate_of_change = previous.as_ref().and_then(|prev| {
            let dt = sample.seconds_since(prev);
            if dt > 0.0 {
                Some(RateOfChange {
                    hrv: (sample.hrv.value - prev.hrv.value) / dt,
                    eda: (sample.eda.value - prev.eda.value) / dt,
                })
            } else {
                None
            }
        });

        // A rate is only meaningful when both ends of it were trusted.
        let floor = config.quality_floor;
        let prev_hrv_trusted = previous.as_ref().map_or(false, |p| p.hrv.is_trusted(floor));
        let prev_eda_trusted = previous.as_ref().map_or(false, |p| p.eda.is_trusted(floor));
        let hrv_rate = rate_of_change
            .filter(|_| prev_hrv_trusted)
            .map(|r| r.hrv);
        let eda_rate = rate_of_change
            .filter(|_| prev_eda_trusted)
            .map(|r| r.eda);

        let hrv = self.evaluate_channel(
            sample.hrv,
            baseline.hrv,
            Direction::Falling,
            config.hrv_drop_pct,
            hrv_rate,
            config.hrv_rate_limit,
        );
        let eda = self.evaluate_channel(
            sample.eda,
            baseline.eda,
            Direction::Rising,
            config.eda_rise_pct,
            eda_rate,
            config.eda_rate_limit,
        );

        let has_signal = hrv.trusted || eda.trusted;
        let anxiety_score = self.combined_score(&hrv, &eda);
        let qualifies = (hrv.analysis.is_alert() || eda.analysis.is_alert())
            && anxiety_score >= config.min_alert_score;

        let mut hysteresis =
            prior.advance(qualifies, config.set_threshold, config.clear_threshold);
        // Without any trusted channel the latch is released, so re-entering
        // the anxious state needs a fresh run of qualifying samples.
        if !has_signal {
            hysteresis.is_anxious = false;
        }
        let is_anxious = hysteresis.is_anxious;

        let severity = is_anxious.then(|| self.severity(anxiety_score));
        let confidence = self.confidence(&hrv, &eda, anxiety_score);

        let mut triggers = Vec::new();
        if hrv.deviation_alert {
            triggers.push(Trigger::HrvDrop);
        }
        if eda.deviation_alert {
            triggers.push(Trigger::EdaRise);
        }
        if hrv.rate_alert {
            triggers.push(Trigger::HrvRapidChange);
        }
        if eda.rate_alert {
            triggers.push(Trigger::EdaRapidChange);
        }
        if !hrv.trusted || !eda.trusted {
            triggers.push(Trigger::LowSignalQuality);
        }

        let analysis = AnxietyAnalysis {
            user_id: sample.user_id.clone(),
            is_anxious,
            confidence,
            timestamp: sample.timestamp,
            severity,
            anxiety_score,
            consecutive_readings: hysteresis.consecutive_anxious,
            metrics: AnalysisMetrics {
                hrv: hrv.analysis,
                eda: eda.analysis,
                rate_of_change,
            },
            triggers,
        };

        Classification {
            analysis,
            hysteresis,
        }
    }

    fn evaluate_channel(
        &self,
        reading: ChannelReading,
        baseline: f64,
        direction: Direction,
        threshold_pct: f64,
        rate: Option<f64>,
        rate_limit: f64,
    ) -> ChannelEval {
        let trusted = reading.is_trusted(self.config.quality_floor);

        let deviation_pct = if baseline > 0.0 {
            match direction {
                Direction::Falling => (baseline - reading.value) / baseline * 100.0,
                Direction::Rising => (reading.value - baseline) / baseline * 100.0,
            }
        } else {
            0.0
        };
        let deviation_score = (deviation_pct / threshold_pct).max(0.0);

        let rate_score = rate
            .map(|r| match direction {
                Direction::Falling => -r / rate_limit,
                Direction::Rising => r / rate_limit,
            })
            .unwrap_or(0.0)
            .max(0.0);

        let deviation_alert = trusted && deviation_pct >= threshold_pct;
        let rate_alert = trusted && rate_score >= 1.0;
        let score = deviation_score.max(rate_score).min(self.config.score_cap);

        let status = if deviation_alert || rate_alert {
            MetricStatus::Alert
        } else {
            MetricStatus::Normal
        };

        ChannelEval {
            analysis: MetricAnalysis {
                value: reading.value,
                score,
                status,
            },
            quality: reading.quality,
            trusted,
            deviation_alert,
            rate_alert,
        }
    }

    /// Weighted score of the trusted channels
    fn combined_score(&self, hrv: &ChannelEval, eda: &ChannelEval) -> f64 {
        let mut score = 0.0;
        if hrv.trusted {
            score += self.config.hrv_weight * hrv.analysis.score;
        }
        if eda.trusted {
            score += self.config.eda_weight * eda.analysis.score;
        }
        score
    }

    /// Severity breakpoints, only meaningful while anxious
    pub fn severity(&self, anxiety_score: f64) -> Severity {
        if anxiety_score >= self.config.severe_score {
            Severity::Severe
        } else if anxiety_score >= self.config.moderate_score {
            Severity::Moderate
        } else {
            Severity::Mild
        }
    }

    /// Mean trusted quality, scaled up by the distance from the alert line
    fn confidence(&self, hrv: &ChannelEval, eda: &ChannelEval, anxiety_score: f64) -> f64 {
        let qualities: Vec<f64> = [hrv, eda]
            .iter()
            .filter(|c| c.trusted)
            .map(|c| c.quality)
            .collect();
        if qualities.is_empty() {
            return 0.0;
        }

        let quality = qualities.iter().sum::<f64>() / qualities.len() as f64 / 100.0;
        let margin = ((anxiety_score - self.config.min_alert_score).abs()
            / self.config.min_alert_score)
            .min(1.0);

        (quality * (0.5 + 0.5 * margin)).clamp(0.0, 1.0)
    }
}
