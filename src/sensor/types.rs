//! Core sample types
//!
//! A `Sample` is one timestamped HRV/EDA reading for a user. Samples are
//! immutable once produced; readings that arrive with missing or
//! out-of-range fields are repaired by [`Sample::sanitized`] so the rest of
//! the pipeline never has to deal with NaN values or impossible qualities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Highest valid signal quality
pub const MAX_QUALITY: f64 = 100.0;

/// One physiological channel reading
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChannelReading {
    /// Raw physiological value (ms for HRV, µS for EDA)
    #[serde(default = "missing_value", deserialize_with = "lenient_f64")]
    pub value: f64,
    /// Signal quality in [0, 100]
    #[serde(default = "missing_value", deserialize_with = "lenient_f64")]
    pub quality: f64,
}

fn missing_value() -> f64 {
    f64::NAN
}

/// Accept numbers and `null`; anything absent becomes NaN and is
/// repaired later by `sanitized`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl ChannelReading {
    /// Create a reading
    pub fn new(value: f64, quality: f64) -> Self {
        Self { value, quality }
    }

    /// A reading with no usable signal
    pub fn missing() -> Self {
        Self {
            value: f64::NAN,
            quality: f64::NAN,
        }
    }

    /// Repair out-of-range fields.
    ///
    /// A non-finite or negative value becomes `0.0` with quality `0`; a
    /// quality outside `[0, 100]` becomes `0`.
    pub fn sanitized(self) -> Self {
        if !self.value.is_finite() || self.value < 0.0 {
            return Self {
                value: 0.0,
                quality: 0.0,
            };
        }

        let quality = if self.quality.is_finite() && (0.0..=MAX_QUALITY).contains(&self.quality) {
            self.quality
        } else {
            0.0
        };

        Self {
            value: self.value,
            quality,
        }
    }

    /// Whether the quality reaches `floor`
    pub fn is_trusted(&self, floor: f64) -> bool {
        self.quality >= floor
    }
}

impl Default for ChannelReading {
    fn default() -> Self {
        Self::missing()
    }
}

/// A single timestamped biometric sample
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// When the sample was taken (UTC)
    pub timestamp: DateTime<Utc>,
    /// Owner of the sample
    pub user_id: String,
    /// Device that produced the sample
    #[serde(default)]
    pub device_id: String,
    /// Heart-rate variability reading
    #[serde(default)]
    pub hrv: ChannelReading,
    /// Electrodermal activity reading
    #[serde(default)]
    pub eda: ChannelReading,
}

impl Sample {
    /// Create a sample
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        hrv: ChannelReading,
        eda: ChannelReading,
    ) -> Self {
        Self {
            timestamp,
            user_id: user_id.into(),
            device_id: device_id.into(),
            hrv,
            eda,
        }
    }

    /// Copy of this sample with both channels sanitized
    pub fn sanitized(&self) -> Self {
        Self {
            hrv: self.hrv.sanitized(),
            eda: self.eda.sanitized(),
            ..self.clone()
        }
    }

    /// Seconds elapsed since `earlier`, negative if `earlier` is newer
    pub fn seconds_since(&self, earlier: &Sample) -> f64 {
        (self.timestamp - earlier.timestamp).num_milliseconds() as f64 / 1000.0
    }
}
