//! Sample sources
//!
//! A [`SampleSource`] produces samples on demand; pacing is done by the
//! caller (the session driver ticks at the configured sampling rate).
//! [`SimulatedSource`] stands in for wearable hardware: it drifts around
//! resting values and now and then enters an episode where HRV falls and
//! EDA rises.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::types::{ChannelReading, Sample};

/// Produces samples for one user
pub trait SampleSource: Send {
    /// Produce the sample taken at `timestamp`
    fn next_sample(&mut self, timestamp: DateTime<Utc>) -> Sample;
}

/// Creates a source for each new session
pub trait SourceFactory: Send + Sync {
    /// Create a source for `user_id`
    fn create(&self, user_id: &str) -> Box<dyn SampleSource>;
}

/// Simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Resting HRV (ms)
    pub resting_hrv: f64,
    /// Resting EDA (µS)
    pub resting_eda: f64,
    /// HRV during an episode (ms)
    pub episode_hrv: f64,
    /// EDA during an episode (µS)
    pub episode_eda: f64,
    /// Chance per second of entering an episode
    pub episode_probability: f64,
    /// Episode length in seconds
    pub episode_secs: f64,
    /// Chance per sample of a low-quality reading
    pub dropout_probability: f64,
    /// Fixed RNG seed, random when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            resting_hrv: 50.0,
            resting_eda: 2.0,
            episode_hrv: 32.0,
            episode_eda: 3.2,
            episode_probability: 0.02,
            episode_secs: 20.0,
            dropout_probability: 0.03,
            seed: None,
        }
    }
}

/// Random-walk simulator for one user
pub struct SimulatedSource {
    user_id: String,
    device_id: String,
    config: SimulationConfig,
    rng: StdRng,
    hrv: f64,
    eda: f64,
    episode_remaining: f64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// How quickly values move toward their target, per second
const PULL_RATE: f64 = 0.5;
/// Per-second noise amplitude (HRV ms, EDA µS)
const HRV_NOISE: f64 = 1.5;
const EDA_NOISE: f64 = 0.04;

impl SimulatedSource {
    /// Create a simulator for `user_id`
    pub fn new(user_id: impl Into<String>, config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            user_id: user_id.into(),
            device_id: format!("sim-{}", uuid::Uuid::new_v4()),
            hrv: config.resting_hrv,
            eda: config.resting_eda,
            config,
            rng,
            episode_remaining: 0.0,
            last_timestamp: None,
        }
    }

    /// Whether the simulator is currently inside an episode
    pub fn in_episode(&self) -> bool {
        self.episode_remaining > 0.0
    }

    fn quality(&mut self) -> f64 {
        if self.rng.gen::<f64>() < self.config.dropout_probability {
            self.rng.gen_range(5.0..25.0)
        } else {
            self.rng.gen_range(70.0..100.0)
        }
    }
}

impl SampleSource for SimulatedSource {
    fn next_sample(&mut self, timestamp: DateTime<Utc>) -> Sample {
        let dt = self
            .last_timestamp
            .map(|last| ((timestamp - last).num_milliseconds() as f64 / 1000.0).max(0.0))
            .unwrap_or(0.0);
        self.last_timestamp = Some(timestamp);

        if self.in_episode() {
            self.episode_remaining -= dt;
        } else if dt > 0.0 && self.rng.gen::<f64>() < self.config.episode_probability * dt {
            self.episode_remaining = self.config.episode_secs;
            tracing::debug!(user_id = %self.user_id, "Simulated episode started");
        }

        let (target_hrv, target_eda) = if self.in_episode() {
            (self.config.episode_hrv, self.config.episode_eda)
        } else {
            (self.config.resting_hrv, self.config.resting_eda)
        };

        let pull = (PULL_RATE * dt).min(1.0);
        let hrv_noise = self.rng.gen_range(-HRV_NOISE..HRV_NOISE) * dt;
        let eda_noise = self.rng.gen_range(-EDA_NOISE..EDA_NOISE) * dt;
        self.hrv = (self.hrv + (target_hrv - self.hrv) * pull + hrv_noise).max(1.0);
        self.eda = (self.eda + (target_eda - self.eda) * pull + eda_noise).max(0.01);

        let hrv_quality = self.quality();
        let eda_quality = self.quality();

        Sample::new(
            self.user_id.clone(),
            self.device_id.clone(),
            timestamp,
            ChannelReading::new(self.hrv, hrv_quality),
            ChannelReading::new(self.eda, eda_quality),
        )
    }
}

/// Factory producing [`SimulatedSource`]s
#[derive(Debug, Clone, Default)]
pub struct SimulatedSourceFactory {
    config: SimulationConfig,
}

impl SimulatedSourceFactory {
    /// Create a factory
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }
}

impl SourceFactory for SimulatedSourceFactory {
    fn create(&self, user_id: &str) -> Box<dyn SampleSource> {
        Box::new(SimulatedSource::new(user_id, self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            episode_probability: 0.0,
            dropout_probability: 0.0,
            seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_samples_belong_to_user() {
        let mut source = SimulatedSource::new("user-1", quiet_config());
        let sample = source.next_sample(Utc::now());
        assert_eq!(sample.user_id, "user-1");
        assert!(sample.device_id.starts_with("sim-"));
    }

    #[test]
    fn test_resting_values_stay_near_baseline() {
        let mut source = SimulatedSource::new("user-1", quiet_config());
        let start = Utc::now();

        for i in 0..120 {
            let sample = source.next_sample(start + Duration::seconds(i));
            assert!((sample.hrv.value - 50.0).abs() < 10.0);
            assert!((sample.eda.value - 2.0).abs() < 0.5);
            assert!(sample.hrv.quality >= 70.0);
        }
    }

    #[test]
    fn test_episode_moves_values() {
        let config = SimulationConfig {
            episode_probability: 1000.0,
            episode_secs: 1000.0,
            ..quiet_config()
        };
        let mut source = SimulatedSource::new("user-1", config);
        let start = Utc::now();

        let mut last = source.next_sample(start);
        for i in 1..30 {
            last = source.next_sample(start + Duration::seconds(i));
        }

        assert!(source.in_episode());
        assert!(last.hrv.value < 40.0);
        assert!(last.eda.value > 2.8);
    }

    #[test]
    fn test_seeded_sources_are_reproducible() {
        let start = Utc::now();
        let mut a = SimulatedSource::new("u", quiet_config());
        let mut b = SimulatedSource::new("u", quiet_config());

        for i in 0..10 {
            let ts = start + Duration::seconds(i);
            let sa = a.next_sample(ts);
            let sb = b.next_sample(ts);
            assert_eq!(sa.hrv, sb.hrv);
            assert_eq!(sa.eda, sb.eda);
        }
    }
}
