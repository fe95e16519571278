//! Listener types and the error sink

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::AnxietyAnalysis;
use crate::sensor::Sample;

/// A sample and its analysis, delivered together
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SensorUpdate {
    pub sensor_data: Sample,
    pub analysis: AnxietyAnalysis,
}

impl SensorUpdate {
    /// Pair a sample with its analysis
    pub fn new(sensor_data: Sample, analysis: AnxietyAnalysis) -> Self {
        Self {
            sensor_data,
            analysis,
        }
    }

    /// The user both halves belong to
    pub fn user_id(&self) -> &str {
        &self.sensor_data.user_id
    }
}

/// Why a listener failed to handle an update
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListenerError {
    /// The listener returned an error
    #[error("Listener failed: {0}")]
    Failed(String),

    /// The listener's downstream channel is gone
    #[error("Listener disconnected")]
    Disconnected,

    /// The listener panicked
    #[error("Listener panicked: {0}")]
    Panicked(String),
}

/// Callback invoked for every update in a listener's scope
pub type Listener = dyn Fn(&SensorUpdate) -> Result<(), ListenerError> + Send + Sync;

/// Which updates a listener receives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerScope {
    /// Updates for every user
    All,
    /// Updates for one user; cleared when that user's session stops
    User(String),
}

impl ListenerScope {
    /// Whether an update for `user_id` is in scope
    pub fn matches(&self, user_id: &str) -> bool {
        match self {
            ListenerScope::All => true,
            ListenerScope::User(id) => id == user_id,
        }
    }
}

/// A failed delivery
#[derive(Debug, Clone)]
pub struct ListenerFailure {
    pub listener_id: u64,
    pub scope: ListenerScope,
    pub user_id: String,
    pub error: ListenerError,
}

/// Receives listener failures so they never reach the broadcaster
pub trait ErrorSink: Send + Sync {
    fn report(&self, failure: ListenerFailure);
}

/// Logs listener failures through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, failure: ListenerFailure) {
        match failure.error {
            ListenerError::Disconnected => tracing::debug!(
                listener_id = failure.listener_id,
                user_id = %failure.user_id,
                "Listener disconnected"
            ),
            _ => tracing::warn!(
                listener_id = failure.listener_id,
                user_id = %failure.user_id,
                error = %failure.error,
                "Listener failed"
            ),
        }
    }
}
