//! Anxiety Classifier
//!
//! Maps each sample to an [`AnxietyAnalysis`] using per-channel deviation
//! from the user's baseline, rate of change against the previous sample, a
//! fixed weighted combination and a set/clear hysteresis latch.
//!
//! ## Pipeline
//!
//! 1. **Channel scores**: HRV drop and EDA rise relative to baseline,
//!    normalized so that 1.0 is the alert threshold
//! 2. **Rate of change**: per-second deltas; a rapid change alerts a channel
//!    on its own
//! 3. **Combination**: weighted sum of trusted channel scores
//! 4. **Hysteresis**: `is_anxious` flips only after consecutive samples
//! 5. **Grading**: severity breakpoints and confidence
//!
//! ## Example
//!
//! ```rust
//! use biosense::classifier::{Baseline, Classifier, HysteresisState};
//! use biosense::sensor::{ChannelReading, Sample};
//!
//! let classifier = Classifier::default();
//! let sample = Sample::new(
//!     "user-1",
//!     "watch",
//!     chrono::Utc::now(),
//!     ChannelReading::new(35.0, 90.0),
//!     ChannelReading::new(3.0, 90.0),
//! );
//!
//! let result = classifier.classify(
//!     &sample,
//!     &Baseline::new(50.0, 2.0),
//!     None,
//!     HysteresisState::default(),
//! );
//! assert_eq!(result.analysis.consecutive_readings, 1);
//! assert!(!result.analysis.is_anxious);
//! ```

mod analysis;
mod baseline;
mod engine;
mod policy;

pub use analysis::{
    AnalysisMetrics, AnxietyAnalysis, MetricAnalysis, MetricStatus, RateOfChange, Severity,
    Trigger,
};
pub use baseline::{Baseline, BaselineConfig};
pub use engine::{Classification, Classifier, HysteresisState};
pub use policy::ClassifierConfig;
