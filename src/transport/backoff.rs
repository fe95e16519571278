//! Reconnect policies
//!
//! A policy only decides how long to wait before the next attempt; the
//! transport still checks the "should stay connected" flag before each one.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether and when to retry after an unexpected close
pub trait ReconnectPolicy: Send + Sync + Debug {
    /// Delay before attempt number `attempt` (starting at 1), or `None` to
    /// stop retrying
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Never retries; the next explicit `connect` reopens the connection
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReconnect;

impl ReconnectPolicy for NoReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Doubling delays capped at `max`, for at most `max_attempts` attempts
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 5)
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.base.saturating_mul(factor).min(self.max))
    }
}

/// Reconnect settings as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Retry after unexpected closes
    pub enabled: bool,
    /// First retry delay
    pub base_delay_ms: u64,
    /// Upper bound for any delay
    pub max_delay_ms: u64,
    /// Attempts before giving up until the next explicit connect
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Build the policy these settings describe
    pub fn policy(&self) -> Arc<dyn ReconnectPolicy> {
        if self.enabled && self.max_attempts > 0 {
            Arc::new(ExponentialBackoff::new(
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
                self.max_attempts,
            ))
        } else {
            Arc::new(NoReconnect)
        }
    }
}
