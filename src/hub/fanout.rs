//! Fan-out Hub
//!
//! Keeps an ordered list of listeners and delivers every update to the
//! listeners in its scope. Broadcast iterates over a snapshot taken under the
//! read lock, so listeners may subscribe or unsubscribe (even from inside a
//! callback) without disturbing a delivery in progress.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::listener::{
    ErrorSink, Listener, ListenerError, ListenerFailure, ListenerScope, SensorUpdate,
    TracingErrorSink,
};

/// Configuration for the fan-out hub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    /// Maximum number of registered listeners
    pub max_listeners: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_listeners: 1000,
        }
    }
}

/// Token returned by `subscribe`; removes exactly one listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    scope: ListenerScope,
}

impl Subscription {
    /// Listener id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Listener scope
    pub fn scope(&self) -> &ListenerScope {
        &self.scope
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Called once when `clear_user` or `clear` drops a listener
pub type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

struct ListenerEntry {
    id: u64,
    scope: ListenerScope,
    callback: Arc<Listener>,
    on_release: Option<ReleaseHook>,
}

/// Ordered, scope-aware listener set
pub struct FanoutHub {
    listeners: RwLock<Vec<ListenerEntry>>,
    next_id: AtomicU64,
    error_sink: Arc<dyn ErrorSink>,
    config: HubConfig,
}

impl FanoutHub {
    /// Create a hub that logs listener failures
    pub fn new(config: HubConfig) -> Self {
        Self::with_error_sink(config, Arc::new(TracingErrorSink))
    }

    /// Create a hub reporting listener failures to `error_sink`
    pub fn with_error_sink(config: HubConfig, error_sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            error_sink,
            config,
        }
    }

    /// Register a listener for every user's updates
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription, HubError>
    where
        F: Fn(&SensorUpdate) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.register(ListenerScope::All, Arc::new(callback), None)
    }

    /// Register a listener for one user's updates
    pub fn subscribe_user<F>(
        &self,
        user_id: impl Into<String>,
        callback: F,
    ) -> Result<Subscription, HubError>
    where
        F: Fn(&SensorUpdate) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.register(ListenerScope::User(user_id.into()), Arc::new(callback), None)
    }

    /// Register a listener for one user's updates, with a hook that runs if
    /// the hub drops it through [`clear_user`](Self::clear_user) or
    /// [`clear`](Self::clear). `unsubscribe` does not run the hook.
    pub fn subscribe_user_with_release<F, R>(
        &self,
        user_id: impl Into<String>,
        callback: F,
        on_release: R,
    ) -> Result<Subscription, HubError>
    where
        F: Fn(&SensorUpdate) -> Result<(), ListenerError> + Send + Sync + 'static,
        R: FnOnce() + Send + Sync + 'static,
    {
        self.register(
            ListenerScope::User(user_id.into()),
            Arc::new(callback),
            Some(Box::new(on_release)),
        )
    }

    fn register(
        &self,
        scope: ListenerScope,
        callback: Arc<Listener>,
        on_release: Option<ReleaseHook>,
    ) -> Result<Subscription, HubError> {
        let mut listeners = self.listeners.write();
        if listeners.len() >= self.config.max_listeners {
            return Err(HubError::TooManyListeners(self.config.max_listeners));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        listeners.push(ListenerEntry {
            id,
            scope: scope.clone(),
            callback,
            on_release,
        });

        tracing::debug!(listener_id = id, scope = ?scope, "Listener subscribed");
        Ok(Subscription { id, scope })
    }

    /// Remove the listener behind `subscription`.
    ///
    /// Returns false if it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != subscription.id);
        let removed = listeners.len() < before;

        if removed {
            tracing::debug!(listener_id = subscription.id, "Listener unsubscribed");
        }
        removed
    }

    /// Deliver `update` to every listener in scope, in registration order.
    ///
    /// Listener errors and panics are sent to the error sink and do not stop
    /// delivery to later listeners.
    pub fn broadcast(&self, update: &SensorUpdate) -> BroadcastReport {
        let user_id = update.user_id();
        let snapshot: Vec<(u64, ListenerScope, Arc<Listener>)> = self
            .listeners
            .read()
            .iter()
            .filter(|entry| entry.scope.matches(user_id))
            .map(|entry| (entry.id, entry.scope.clone(), Arc::clone(&entry.callback)))
            .collect();

        let mut report = BroadcastReport::default();
        for (id, scope, callback) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| (*callback)(update)))
                .unwrap_or_else(|payload| Err(ListenerError::Panicked(panic_message(&*payload))));

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    report.failed += 1;
                    self.error_sink.report(ListenerFailure {
                        listener_id: id,
                        scope,
                        user_id: user_id.to_string(),
                        error,
                    });
                }
            }
        }

        if report.delivered + report.failed > 0 {
            tracing::trace!(
                user_id = %user_id,
                delivered = report.delivered,
                failed = report.failed,
                "Broadcast update"
            );
        }
        report
    }

    /// Remove every listener scoped to `user_id`; returns how many
    pub fn clear_user(&self, user_id: &str) -> usize {
        let scope = ListenerScope::User(user_id.to_string());
        let removed: Vec<ListenerEntry> = {
            let mut listeners = self.listeners.write();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *listeners)
                .into_iter()
                .partition(|entry| entry.scope == scope);
            *listeners = kept;
            removed
        };

        let count = removed.len();
        if count > 0 {
            tracing::debug!(user_id = %user_id, removed = count, "Cleared user listeners");
        }
        release(removed);
        count
    }

    /// Remove every listener
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.listeners.write());
        release(removed);
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Listener capacity
    pub fn max_listeners(&self) -> usize {
        self.config.max_listeners
    }

    /// Number of listeners scoped to `user_id`
    pub fn user_listener_count(&self, user_id: &str) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|entry| entry.scope == ListenerScope::User(user_id.to_string()))
            .count()
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// Run release hooks outside the listener lock
fn release(entries: Vec<ListenerEntry>) {
    for entry in entries {
        if let Some(hook) = entry.on_release {
            hook();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Errors that can occur in the fan-out hub
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HubError {
    #[error("Too many listeners (limit: {0})")]
    TooManyListeners(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Baseline, Classifier, HysteresisState};
    use crate::sensor::{ChannelReading, Sample};
    use parking_lot::Mutex;
    use std::sync::Weak;

    fn update_for(user_id: &str) -> SensorUpdate {
        let sample = Sample::new(
            user_id,
            "watch",
            chrono::Utc::now(),
            ChannelReading::new(50.0, 90.0),
            ChannelReading::new(2.0, 90.0),
        );
        let analysis = Classifier::default()
            .classify(&sample, &Baseline::new(50.0, 2.0), None, HysteresisState::default())
            .analysis;
        SensorUpdate::new(sample, analysis)
    }

    #[derive(Default)]
    struct CollectingSink {
        failures: Mutex<Vec<ListenerFailure>>,
    }

    impl ErrorSink for CollectingSink {
        fn report(&self, failure: ListenerFailure) {
            self.failures.lock().push(failure);
        }
    }

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> impl Fn(&SensorUpdate) -> Result<(), ListenerError> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_| {
            log.lock().push(name);
            Ok(())
        }
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_listeners, 1000);
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let hub = FanoutHub::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        hub.subscribe(recorder(&log, "first")).unwrap();
        hub.subscribe(recorder(&log, "second")).unwrap();
        hub.subscribe(recorder(&log, "third")).unwrap();

        let report = hub.broadcast(&update_for("user-1"));
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_removes_exactly_one() {
        let hub = FanoutHub::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        hub.subscribe(recorder(&log, "a")).unwrap();
        let b = hub.subscribe(recorder(&log, "b")).unwrap();
        hub.subscribe(recorder(&log, "c")).unwrap();

        assert!(hub.unsubscribe(&b));
        assert!(!hub.unsubscribe(&b));
        hub.broadcast(&update_for("user-1"));

        assert_eq!(*log.lock(), vec!["a", "c"]);
        assert_eq!(hub.listener_count(), 2);
    }

    #[test]
    fn test_failing_listener_does_not_stop_delivery() {
        let sink = Arc::new(CollectingSink::default());
        let hub = FanoutHub::with_error_sink(HubConfig::default(), sink.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        hub.subscribe(recorder(&log, "before")).unwrap();
        hub.subscribe(|_| Err(ListenerError::Failed("boom".to_string())))
            .unwrap();
        hub.subscribe(|_| -> Result<(), ListenerError> { panic!("listener exploded") })
            .unwrap();
        hub.subscribe(recorder(&log, "after")).unwrap();

        let report = hub.broadcast(&update_for("user-1"));

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 2 });
        assert_eq!(*log.lock(), vec!["before", "after"]);

        let failures = sink.failures.lock();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].error, ListenerError::Failed("boom".to_string()));
        assert_eq!(
            failures[1].error,
            ListenerError::Panicked("listener exploded".to_string())
        );
    }

    #[test]
    fn test_listener_added_during_broadcast_waits_for_next() {
        let hub = Arc::new(FanoutHub::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let weak: Weak<FanoutHub> = Arc::downgrade(&hub);
        let late_log = Arc::clone(&log);
        let added = Arc::new(Mutex::new(false));
        let added_flag = Arc::clone(&added);
        hub.subscribe(move |_| {
            let mut added = added_flag.lock();
            if !*added {
                *added = true;
                if let Some(hub) = weak.upgrade() {
                    hub.subscribe(recorder(&late_log, "late")).unwrap();
                }
            }
            Ok(())
        })
        .unwrap();

        hub.broadcast(&update_for("user-1"));
        assert!(log.lock().is_empty());

        hub.broadcast(&update_for("user-1"));
        assert_eq!(*log.lock(), vec!["late"]);
    }

    #[test]
    fn test_listener_removed_during_broadcast_still_gets_current() {
        let hub = Arc::new(FanoutHub::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let target: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let weak = Arc::downgrade(&hub);
        let target_ref = Arc::clone(&target);
        hub.subscribe(move |_| {
            if let (Some(hub), Some(sub)) = (weak.upgrade(), target_ref.lock().take()) {
                hub.unsubscribe(&sub);
            }
            Ok(())
        })
        .unwrap();
        *target.lock() = Some(hub.subscribe(recorder(&log, "victim")).unwrap());

        hub.broadcast(&update_for("user-1"));
        hub.broadcast(&update_for("user-1"));

        assert_eq!(*log.lock(), vec!["victim"]);
    }

    #[test]
    fn test_user_scope_and_clear() {
        let hub = FanoutHub::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        hub.subscribe(recorder(&log, "global")).unwrap();
        hub.subscribe_user("alice", recorder(&log, "alice")).unwrap();
        hub.subscribe_user("bob", recorder(&log, "bob")).unwrap();

        hub.broadcast(&update_for("alice"));
        assert_eq!(*log.lock(), vec!["global", "alice"]);

        assert_eq!(hub.clear_user("alice"), 1);
        assert_eq!(hub.user_listener_count("alice"), 0);
        assert_eq!(hub.user_listener_count("bob"), 1);

        log.lock().clear();
        hub.broadcast(&update_for("alice"));
        assert_eq!(*log.lock(), vec!["global"]);
    }

    #[test]
    fn test_release_hook_runs_on_clear_only() {
        let hub = FanoutHub::default();
        let released = Arc::new(Mutex::new(Vec::new()));

        let hook = |name: &'static str| {
            let released = Arc::clone(&released);
            move || released.lock().push(name)
        };
        hub.subscribe_user_with_release("alice", |_| Ok(()), hook("alice"))
            .unwrap();
        let bob = hub
            .subscribe_user_with_release("bob", |_| Ok(()), hook("bob"))
            .unwrap();
        hub.subscribe_user_with_release("carol", |_| Ok(()), hook("carol"))
            .unwrap();

        assert!(hub.unsubscribe(&bob));
        assert_eq!(hub.clear_user("alice"), 1);
        assert_eq!(*released.lock(), vec!["alice"]);

        hub.clear();
        assert_eq!(*released.lock(), vec!["alice", "carol"]);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_listener_limit() {
        let hub = FanoutHub::new(HubConfig { max_listeners: 1 });
        hub.subscribe(|_| Ok(())).unwrap();

        let result = hub.subscribe(|_| Ok(()));
        assert!(matches!(result, Err(HubError::TooManyListeners(1))));
    }
}
