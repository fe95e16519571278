//! Monitor service
//!
//! Runs the per-sample pipeline: classify against the session's baseline,
//! record the new hysteresis state, broadcast the pair. The session lock is
//! held across all three steps so a user's updates leave in arrival order and
//! nothing is broadcast for a session that has been stopped.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::error::MonitorResult;
use crate::classifier::{AnxietyAnalysis, Baseline, BaselineConfig, Classifier, ClassifierConfig};
use crate::hub::{FanoutHub, ListenerError, SensorUpdate, Subscription};
use crate::sensor::{Sample, SampleSource, SourceFactory};
use crate::session::{
    SessionConfig, SessionError, SessionHandle, SessionLimits, SessionRegistry, SessionSnapshot,
};

/// Pipeline policy
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    pub classifier: ClassifierConfig,
    pub baseline: BaselineConfig,
    pub limits: SessionLimits,
}

/// Outcome of [`MonitorService::start`]
#[derive(Debug, Clone)]
pub struct SessionStart {
    /// False when the user already had an active session
    pub created: bool,
    pub session: SessionSnapshot,
}

/// Owns sessions and drives samples through the pipeline
pub struct MonitorService {
    registry: SessionRegistry,
    classifier: Classifier,
    baseline: BaselineConfig,
    limits: SessionLimits,
    hub: Arc<FanoutHub>,
    sources: Option<Arc<dyn SourceFactory>>,
}

impl MonitorService {
    /// Create a service.
    ///
    /// With a source factory every session gets a driver task producing
    /// samples at its sampling rate; without one, samples only arrive
    /// through [`ingest`](Self::ingest).
    pub fn new(
        config: MonitorConfig,
        hub: Arc<FanoutHub>,
        sources: Option<Arc<dyn SourceFactory>>,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            classifier: Classifier::new(config.classifier),
            baseline: config.baseline,
            limits: config.limits,
            hub,
            sources,
        }
    }

    /// The hub updates are broadcast to
    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }

    /// The classifier in use
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Start monitoring a user, or return the active session.
    ///
    /// The config is validated before anything is created.
    pub async fn start(self: &Arc<Self>, config: SessionConfig) -> MonitorResult<SessionStart> {
        config.validate(&self.limits)?;

        if let Some(existing) = self.registry.get(&config.user_id).await {
            let session = existing.lock().await.snapshot();
            return Ok(SessionStart {
                created: false,
                session,
            });
        }

        let mut source = self.sources.as_ref().map(|f| f.create(&config.user_id));
        let baseline = self.initial_baseline(&config, source.as_deref_mut());

        let user_id = config.user_id.clone();
        let sampling_rate = config.sampling_rate;
        let max_samples = config
            .simulation_duration
            .map(|secs| (secs * sampling_rate).ceil().max(1.0) as u64);

        let outcome = self.registry.start(config, move || baseline).await;
        if outcome.created {
            if let Some(source) = source {
                self.spawn_driver(&user_id, &outcome.handle, source, sampling_rate, max_samples)
                    .await;
            }
        }

        let session = outcome.handle.lock().await.snapshot();
        Ok(SessionStart {
            created: outcome.created,
            session,
        })
    }

    fn initial_baseline(
        &self,
        config: &SessionConfig,
        source: Option<&mut (dyn SampleSource + 'static)>,
    ) -> Baseline {
        if let Some(baseline) = config.baseline {
            return baseline;
        }

        let defaults = self.baseline.defaults();
        let window = self.baseline.calibration_samples;
        let Some(source) = source.filter(|_| window > 0) else {
            return defaults;
        };

        // The calibration window ends at session start
        let period_ms = (1000.0 / config.sampling_rate).round() as i64;
        let now = Utc::now();
        let samples: Vec<Sample> = (0..window)
            .map(|i| {
                let offset = ChronoDuration::milliseconds(period_ms * (window - i) as i64);
                source.next_sample(now - offset)
            })
            .collect();

        let baseline = Baseline::calibrate(&samples, self.classifier.config().quality_floor, defaults);
        tracing::debug!(
            user_id = %config.user_id,
            window,
            baseline_hrv = baseline.hrv,
            baseline_eda = baseline.eda,
            "Baseline calibrated"
        );
        baseline
    }

    async fn spawn_driver(
        self: &Arc<Self>,
        user_id: &str,
        handle: &SessionHandle,
        source: Box<dyn SampleSource>,
        sampling_rate: f64,
        max_samples: Option<u64>,
    ) {
        let task = tokio::spawn(Arc::clone(self).drive(
            user_id.to_string(),
            Arc::clone(handle),
            source,
            sampling_rate,
            max_samples,
        ));

        let mut state = handle.lock().await;
        if state.is_active {
            state.driver = Some(task.abort_handle());
        } else {
            // Stopped before the driver was attached
            task.abort();
        }
    }

    async fn drive(
        self: Arc<Self>,
        user_id: String,
        handle: SessionHandle,
        mut source: Box<dyn SampleSource>,
        sampling_rate: f64,
        max_samples: Option<u64>,
    ) {
        // First sample one period after start, giving stream clients time to register
        let period = Duration::from_secs_f64(1.0 / sampling_rate);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(user_id = %user_id, sampling_rate, max_samples = ?max_samples, "Driver started");

        let mut produced = 0u64;
        while max_samples.map_or(true, |max| produced < max) {
            ticker.tick().await;
            let sample = source.next_sample(Utc::now());
            if self.process(&handle, sample).await.is_none() {
                return;
            }
            produced += 1;
        }

        // Detach first so the stop below does not abort this task
        handle.lock().await.driver = None;
        tracing::info!(user_id = %user_id, samples = produced, "Simulation finished");
        if self.registry.stop_if_current(&user_id, &handle).await.is_some() {
            self.hub.clear_user(&user_id);
        }
    }

    /// Classify, record and broadcast one sample.
    ///
    /// Returns `None` when the session was stopped before the lock was taken.
    async fn process(&self, handle: &SessionHandle, sample: Sample) -> Option<AnxietyAnalysis> {
        let mut state = handle.lock().await;
        if !state.is_active {
            tracing::debug!(user_id = %sample.user_id, "Discarding sample for stopped session");
            return None;
        }

        let was_anxious = state.hysteresis.is_anxious;
        let classification = self.classifier.classify(
            &sample,
            &state.baseline,
            state.last_reading.as_ref(),
            state.hysteresis,
        );
        let analysis = classification.analysis.clone();
        state.record(sample.clone(), &classification);

        if analysis.is_anxious != was_anxious {
            tracing::info!(
                user_id = %analysis.user_id,
                is_anxious = analysis.is_anxious,
                severity = ?analysis.severity,
                anxiety_score = analysis.anxiety_score,
                "Anxiety state changed"
            );
        }

        self.hub.broadcast(&SensorUpdate::new(sample, analysis.clone()));
        Some(analysis)
    }

    /// Push an externally produced sample through the pipeline
    pub async fn ingest(&self, sample: Sample) -> MonitorResult<AnxietyAnalysis> {
        if sample.user_id.trim().is_empty() {
            return Err(SessionError::Validation("userId is required".to_string()).into());
        }

        let handle = self
            .registry
            .get(&sample.user_id)
            .await
            .ok_or_else(|| SessionError::NotFound(sample.user_id.clone()))?;

        let user_id = sample.user_id.clone();
        self.process(&handle, sample)
            .await
            .ok_or_else(|| SessionError::NotFound(user_id).into())
    }

    /// Stop monitoring a user and drop the listeners scoped to them.
    ///
    /// Returns the final snapshot, or `None` if there was no session.
    pub async fn stop(&self, user_id: &str) -> Option<SessionSnapshot> {
        let snapshot = self.registry.stop(user_id).await;
        let cleared = self.hub.clear_user(user_id);
        if snapshot.is_none() {
            tracing::debug!(user_id = %user_id, cleared, "Stop for inactive user");
        }
        snapshot
    }

    /// Stop every session
    pub async fn shutdown(&self) {
        for session in self.registry.list().await {
            self.stop(&session.user_id).await;
        }
    }

    /// Snapshot of one session
    pub async fn get_state(&self, user_id: &str) -> MonitorResult<SessionSnapshot> {
        Ok(self.registry.get_state(user_id).await?)
    }

    /// Snapshots of all sessions
    pub async fn list_sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.list().await
    }

    /// Number of active sessions
    pub async fn active_count(&self) -> usize {
        self.registry.active_count().await
    }

    /// Receive every user's updates
    pub fn subscribe<F>(&self, callback: F) -> MonitorResult<Subscription>
    where
        F: Fn(&SensorUpdate) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Ok(self.hub.subscribe(callback)?)
    }

    /// Receive one user's updates until that user is stopped
    pub fn subscribe_user<F>(&self, user_id: &str, callback: F) -> MonitorResult<Subscription>
    where
        F: Fn(&SensorUpdate) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Ok(self.hub.subscribe_user(user_id, callback)?)
    }

    /// Remove a listener
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.hub.unsubscribe(subscription)
    }
}
