//! Session Registry
//!
//! Maps user ids to session records. The map lock is held only long enough
//! to look up, insert or remove an entry; each record carries its own mutex
//! so that work on one user never waits on another.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::error::{SessionError, SessionResult};
use super::state::{SessionConfig, SessionSnapshot, UserState};
use crate::classifier::Baseline;

/// Shared handle to one session record
pub type SessionHandle = Arc<Mutex<UserState>>;

/// Result of [`SessionRegistry::start`]
#[derive(Debug, Clone)]
pub struct StartOutcome {
    /// The session record, new or existing
    pub handle: SessionHandle,
    /// Whether this call created the session
    pub created: bool,
}

/// Owns all active sessions
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session, or return the active one for the same user.
    ///
    /// `baseline` is only evaluated when a new session is created.
    pub async fn start<F>(&self, config: SessionConfig, baseline: F) -> StartOutcome
    where
        F: FnOnce() -> Baseline,
    {
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(&config.user_id) {
            tracing::debug!(user_id = %config.user_id, "Session already active");
            return StartOutcome {
                handle: Arc::clone(existing),
                created: false,
            };
        }

        let user_id = config.user_id.clone();
        let baseline = baseline();
        let handle = Arc::new(Mutex::new(UserState::new(config, baseline)));
        sessions.insert(user_id.clone(), Arc::clone(&handle));

        tracing::info!(
            user_id = %user_id,
            baseline_hrv = baseline.hrv,
            baseline_eda = baseline.eda,
            "Session started"
        );

        StartOutcome {
            handle,
            created: true,
        }
    }

    /// Deactivate and discard a session.
    ///
    /// Returns the final snapshot, or `None` when no session existed.
    /// Any driver task attached to the session is aborted.
    pub async fn stop(&self, user_id: &str) -> Option<SessionSnapshot> {
        let handle = self.sessions.write().await.remove(user_id)?;
        Some(Self::deactivate(user_id, &handle).await)
    }

    async fn deactivate(user_id: &str, handle: &SessionHandle) -> SessionSnapshot {
        let mut state = handle.lock().await;
        state.is_active = false;
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }

        tracing::info!(
            user_id = %user_id,
            samples = state.samples_processed,
            "Session stopped"
        );
        state.snapshot()
    }

    /// Like [`stop`](Self::stop), but only if `handle` is still the
    /// registered record for `user_id`
    pub async fn stop_if_current(
        &self,
        user_id: &str,
        handle: &SessionHandle,
    ) -> Option<SessionSnapshot> {
        {
            let mut sessions = self.sessions.write().await;
            match sessions.get(user_id) {
                Some(current) if Arc::ptr_eq(current, handle) => {
                    sessions.remove(user_id);
                }
                _ => return None,
            }
        }
        Some(Self::deactivate(user_id, handle).await)
    }

    /// The record for an active session
    pub async fn get(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Snapshot of one session
    pub async fn get_state(&self, user_id: &str) -> SessionResult<SessionSnapshot> {
        let handle = self
            .get(user_id)
            .await
            .ok_or_else(|| SessionError::NotFound(user_id.to_string()))?;
        let state = handle.lock().await;
        Ok(state.snapshot())
    }

    /// Snapshots of all sessions, ordered by user id
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.lock().await.snapshot());
        }
        snapshots.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        snapshots
    }

    /// Number of active sessions
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Baseline {
        Baseline::new(50.0, 2.0)
    }

    #[tokio::test]
    async fn test_start_creates_session() {
        let registry = SessionRegistry::new();
        let outcome = registry.start(SessionConfig::new("user-1", 1.0), defaults).await;

        assert!(outcome.created);
        let state = registry.get_state("user-1").await.unwrap();
        assert!(state.is_active);
        assert_eq!(state.baseline_hrv, 50.0);
        assert_eq!(state.consecutive_anxious_readings, 0);
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_double_start_returns_same_state() {
        let registry = SessionRegistry::new();
        let first = registry.start(SessionConfig::new("user-1", 1.0), defaults).await;
        let second = registry
            .start(SessionConfig::new("user-1", 5.0), || {
                panic!("baseline must not be computed for an existing session")
            })
            .await;

        assert!(first.created);
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.handle, &second.handle));
        assert_eq!(registry.active_count().await, 1);
        assert_eq!(second.handle.lock().await.config.sampling_rate, 1.0);
    }

    #[tokio::test]
    async fn test_stop_discards_session() {
        let registry = SessionRegistry::new();
        let outcome = registry.start(SessionConfig::new("user-1", 1.0), defaults).await;

        let snapshot = registry.stop("user-1").await.unwrap();
        assert!(!snapshot.is_active);
        assert!(!outcome.handle.lock().await.is_active);
        assert_eq!(
            registry.get_state("user-1").await,
            Err(SessionError::NotFound("user-1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_double_stop_is_noop() {
        let registry = SessionRegistry::new();
        assert!(registry.stop("nobody").await.is_none());

        registry.start(SessionConfig::new("user-1", 1.0), defaults).await;
        assert!(registry.stop("user-1").await.is_some());
        assert!(registry.stop("user-1").await.is_none());
    }

    #[tokio::test]
    async fn test_restart_after_stop_is_fresh() {
        let registry = SessionRegistry::new();
        let first = registry.start(SessionConfig::new("user-1", 1.0), defaults).await;
        first.handle.lock().await.samples_processed = 10;
        registry.stop("user-1").await;

        let second = registry.start(SessionConfig::new("user-1", 1.0), defaults).await;
        assert!(second.created);
        assert!(!Arc::ptr_eq(&first.handle, &second.handle));
        assert_eq!(second.handle.lock().await.samples_processed, 0);
    }

    #[tokio::test]
    async fn test_stop_aborts_driver() {
        let registry = SessionRegistry::new();
        let outcome = registry.start(SessionConfig::new("user-1", 1.0), defaults).await;

        let task = tokio::spawn(std::future::pending::<()>());
        outcome.handle.lock().await.driver = Some(task.abort_handle());

        registry.stop("user-1").await;
        let err = task.await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_stop_if_current_ignores_replaced_session() {
        let registry = SessionRegistry::new();
        let first = registry.start(SessionConfig::new("user-1", 1.0), defaults).await;
        registry.stop("user-1").await;
        let second = registry.start(SessionConfig::new("user-1", 1.0), defaults).await;

        assert!(registry.stop_if_current("user-1", &first.handle).await.is_none());
        assert!(second.handle.lock().await.is_active);

        assert!(registry.stop_if_current("user-1", &second.handle).await.is_some());
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let registry = SessionRegistry::new();
        registry.start(SessionConfig::new("b", 1.0), defaults).await;
        registry.start(SessionConfig::new("a", 1.0), defaults).await;

        let ids: Vec<String> = registry.list().await.into_iter().map(|s| s.user_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_concurrent_starts_converge() {
        let registry = Arc::new(SessionRegistry::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.start(SessionConfig::new("user-1", 1.0), defaults).await
            }));
        }

        let mut created = 0;
        let mut handles = Vec::new();
        for task in tasks {
            let outcome = task.await.unwrap();
            if outcome.created {
                created += 1;
            }
            handles.push(outcome.handle);
        }

        assert_eq!(created, 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }
}
