//! Transport Manager
//!
//! Owns one streaming connection per user. Each open connection is driven by
//! a reader task that feeds received updates into the client-side hub and,
//! after an unexpected close, asks the reconnect policy whether to retry.
//!
//! Per user, `connect` and `disconnect` are serialized by an operation lock,
//! so a second `connect` never opens a second connection.

use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::backoff::{ReconnectConfig, ReconnectPolicy};
use super::connector::{Connector, Link, WsConnector};
use super::error::{TransportError, TransportResult};
use super::state::ConnectionState;
use crate::hub::FanoutHub;
use crate::websocket::{status, ClientMessage, ServerMessage};

/// Transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Streaming endpoint of the monitor server
    pub url: String,
    /// Time allowed for opening a connection
    pub connect_timeout_ms: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8082/api/v1/ws".to_string(),
            connect_timeout_ms: 10_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

struct Shared {
    connector: Arc<dyn Connector>,
    policy: Arc<dyn ReconnectPolicy>,
    hub: Arc<FanoutHub>,
    url: String,
    connect_timeout: Duration,
}

impl Shared {
    /// Open a connection and register the user.
    ///
    /// Returns once the server has acknowledged the registration, so every
    /// update produced afterwards reaches this link.
    async fn open(&self, user_id: &str) -> TransportResult<Box<dyn Link>> {
        let timeout_ms = self.connect_timeout.as_millis() as u64;
        tokio::time::timeout(self.connect_timeout, self.open_registered(user_id))
            .await
            .map_err(|_| TransportError::Timeout(timeout_ms))?
    }

    async fn open_registered(&self, user_id: &str) -> TransportResult<Box<dyn Link>> {
        let mut link = self.connector.connect(&self.url).await?;

        if let Err(e) = link.send_text(register_frame(user_id)?).await {
            let _ = link.close().await;
            return Err(e);
        }

        loop {
            let text = match link.recv_text().await {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    let _ = link.close().await;
                    return Err(e);
                }
                None => {
                    return Err(TransportError::Connect(
                        "closed before registration was acknowledged".to_string(),
                    ))
                }
            };

            match serde_json::from_str::<ServerMessage>(&text) {
                Ok(ServerMessage::Connection { status: ack, .. }) if ack == status::REGISTERED => {
                    tracing::debug!(user_id = %user_id, "Registration acknowledged");
                    return Ok(link);
                }
                Ok(ServerMessage::Error { message }) => {
                    let _ = link.close().await;
                    return Err(TransportError::Rejected(message));
                }
                _ => {
                    self.dispatch(user_id, &text);
                }
            }
        }
    }

    /// Handle one received frame
    fn dispatch(&self, user_id: &str, text: &str) -> Dispatch {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::SensorUpdate { data }) => {
                if data.user_id() != user_id {
                    tracing::debug!(
                        user_id = %user_id,
                        update_user_id = %data.user_id(),
                        "Dropping update for another user"
                    );
                    return Dispatch::Handled;
                }
                self.hub.broadcast(&data);
            }
            Ok(ServerMessage::Connection { status: state, .. }) if state == status::STOPPED => {
                tracing::info!(user_id = %user_id, "Server stopped the session");
                return Dispatch::Released;
            }
            Ok(ServerMessage::Connection {
                status, message, ..
            }) => {
                tracing::debug!(user_id = %user_id, status = %status, message = %message, "Server acknowledged");
            }
            Ok(ServerMessage::Pong) => {
                tracing::trace!(user_id = %user_id, "Pong");
            }
            Ok(ServerMessage::Error { message }) => {
                tracing::warn!(user_id = %user_id, message = %message, "Server reported error");
            }
            Ok(ServerMessage::Unknown) => {
                tracing::debug!(user_id = %user_id, text = %text, "Ignoring unknown message type");
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Dropping malformed message");
            }
        }
        Dispatch::Handled
    }
}

/// What the reader should do after a frame
enum Dispatch {
    Handled,
    /// The server dropped this link's registration
    Released,
}

fn register_frame(user_id: &str) -> TransportResult<String> {
    serde_json::to_string(&ClientMessage::Register {
        user_id: user_id.to_string(),
    })
    .map_err(|e| TransportError::Encode(e.to_string()))
}

/// Reader task of an open connection
struct LinkTask {
    close_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl LinkTask {
    async fn shutdown(self) {
        let _ = self.close_tx.send(());
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Transport reader panicked");
            }
        }
    }
}

/// Connection record of one user
struct UserLink {
    user_id: String,
    state: SyncMutex<ConnectionState>,
    stay_connected: AtomicBool,
    op_lock: Mutex<()>,
    task: SyncMutex<Option<LinkTask>>,
}

impl UserLink {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            state: SyncMutex::new(ConnectionState::Disconnected),
            stay_connected: AtomicBool::new(false),
            op_lock: Mutex::new(()),
            task: SyncMutex::new(None),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn stay_connected(&self) -> bool {
        self.stay_connected.load(Ordering::SeqCst)
    }

    fn transition(&self, next: ConnectionState) -> TransportResult<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(TransportError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        tracing::debug!(user_id = %self.user_id, from = %*state, to = %next, "Transport state change");
        *state = next;
        Ok(())
    }

    fn force(&self, next: ConnectionState) {
        *self.state.lock() = next;
    }
}

enum PumpEnd {
    CloseRequested,
    PeerClosed,
}

/// Manages streaming connections, one per user
pub struct TransportManager {
    shared: Arc<Shared>,
    links: SyncMutex<HashMap<String, Arc<UserLink>>>,
}

impl TransportManager {
    /// Create a manager using WebSockets
    pub fn new(config: &TransportConfig, hub: Arc<FanoutHub>) -> Self {
        Self::with_parts(
            config,
            hub,
            Arc::new(WsConnector),
            config.reconnect.policy(),
        )
    }

    /// Create a manager with a custom connector and reconnect policy
    pub fn with_parts(
        config: &TransportConfig,
        hub: Arc<FanoutHub>,
        connector: Arc<dyn Connector>,
        policy: Arc<dyn ReconnectPolicy>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                policy,
                hub,
                url: config.url.clone(),
                connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            }),
            links: SyncMutex::new(HashMap::new()),
        }
    }

    /// Hub receiving this manager's updates
    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.shared.hub
    }

    fn link(&self, user_id: &str) -> Arc<UserLink> {
        let mut links = self.links.lock();
        Arc::clone(
            links
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(UserLink::new(user_id))),
        )
    }

    fn is_current(&self, user_id: &str, link: &Arc<UserLink>) -> bool {
        self.links
            .lock()
            .get(user_id)
            .is_some_and(|current| Arc::ptr_eq(current, link))
    }

    /// Open the user's connection and register.
    ///
    /// A no-op while the connection is open or opening. On failure the
    /// "should stay connected" flag stays set and the state returns to
    /// `Disconnected`.
    pub async fn connect(&self, user_id: &str) -> TransportResult<()> {
        loop {
            let link = self.link(user_id);
            let _guard = link.op_lock.lock().await;
            // A concurrent disconnect may have retired this record
            if !self.is_current(user_id, &link) {
                continue;
            }
            return self.connect_locked(&link).await;
        }
    }

    async fn connect_locked(&self, link: &Arc<UserLink>) -> TransportResult<()> {
        link.stay_connected.store(true, Ordering::SeqCst);

        if link.state().is_live() {
            tracing::debug!(user_id = %link.user_id, state = %link.state(), "Already connected");
            return Ok(());
        }

        // An explicit connect replaces any pending reconnect loop
        let previous = link.task.lock().take();
        if let Some(task) = previous {
            task.shutdown().await;
            if link.state() != ConnectionState::Disconnected {
                link.force(ConnectionState::Disconnected);
            }
        }

        link.transition(ConnectionState::Connecting)?;
        let conn = match self.shared.open(&link.user_id).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(user_id = %link.user_id, error = %e, "Connection failed");
                let _ = link.transition(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        link.transition(ConnectionState::Connected)?;

        let (close_tx, close_rx) = oneshot::channel();
        let handle = tokio::spawn(run_link(
            Arc::clone(&self.shared),
            Arc::clone(link),
            conn,
            close_rx,
        ));
        *link.task.lock() = Some(LinkTask { close_tx, handle });

        tracing::info!(user_id = %link.user_id, url = %self.shared.url, "Transport connected");
        Ok(())
    }

    /// Close the user's connection and stop any reconnect attempts.
    ///
    /// Always ends in `Disconnected`; a no-op for unknown users.
    pub async fn disconnect(&self, user_id: &str) {
        let Some(link) = self.links.lock().get(user_id).cloned() else {
            tracing::debug!(user_id = %user_id, "No transport to disconnect");
            return;
        };

        let _guard = link.op_lock.lock().await;
        link.stay_connected.store(false, Ordering::SeqCst);
        if link.transition(ConnectionState::Stopping).is_err() {
            link.force(ConnectionState::Stopping);
        }

        let task = link.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }
        link.force(ConnectionState::Disconnected);

        let mut links = self.links.lock();
        if links.get(user_id).is_some_and(|current| Arc::ptr_eq(current, &link)) {
            links.remove(user_id);
        }
        tracing::info!(user_id = %user_id, "Transport disconnected");
    }

    /// Disconnect every user
    pub async fn shutdown(&self) {
        let users: Vec<String> = self.links.lock().keys().cloned().collect();
        for user_id in users {
            self.disconnect(&user_id).await;
        }
    }

    /// Current state of the user's connection
    pub fn state(&self, user_id: &str) -> ConnectionState {
        self.links
            .lock()
            .get(user_id)
            .map(|link| link.state())
            .unwrap_or_default()
    }

    /// Whether the user's connection is open
    pub fn is_connected(&self, user_id: &str) -> bool {
        self.state(user_id) == ConnectionState::Connected
    }

    /// Whether the user's connection is wanted
    pub fn should_stay_connected(&self, user_id: &str) -> bool {
        self.links
            .lock()
            .get(user_id)
            .is_some_and(|link| link.stay_connected())
    }
}

async fn run_link(
    shared: Arc<Shared>,
    link: Arc<UserLink>,
    mut conn: Box<dyn Link>,
    mut close_rx: oneshot::Receiver<()>,
) {
    loop {
        match pump(&shared, &link, conn.as_mut(), &mut close_rx).await {
            PumpEnd::CloseRequested => {
                if let Err(e) = conn.close().await {
                    tracing::debug!(user_id = %link.user_id, error = %e, "Close failed");
                }
                return;
            }
            PumpEnd::PeerClosed => {}
        }

        let _ = link.transition(ConnectionState::Disconnected);
        if !link.stay_connected() {
            return;
        }
        tracing::warn!(user_id = %link.user_id, "Connection lost");

        match reconnect(&shared, &link, &mut close_rx).await {
            Some(next) => conn = next,
            None => return,
        }
    }
}

async fn pump(
    shared: &Shared,
    link: &UserLink,
    conn: &mut dyn Link,
    close_rx: &mut oneshot::Receiver<()>,
) -> PumpEnd {
    loop {
        tokio::select! {
            _ = &mut *close_rx => return PumpEnd::CloseRequested,
            frame = conn.recv_text() => match frame {
                Some(Ok(text)) => {
                    let released = matches!(shared.dispatch(&link.user_id, &text), Dispatch::Released);
                    // Register again so a restarted session streams to this link
                    if released && link.stay_connected() {
                        let sent = match register_frame(&link.user_id) {
                            Ok(frame) => conn.send_text(frame).await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = sent {
                            tracing::warn!(user_id = %link.user_id, error = %e, "Re-registration failed");
                            return PumpEnd::PeerClosed;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(user_id = %link.user_id, error = %e, "Receive failed");
                    return PumpEnd::PeerClosed;
                }
                None => return PumpEnd::PeerClosed,
            },
        }
    }
}

async fn reconnect(
    shared: &Shared,
    link: &UserLink,
    close_rx: &mut oneshot::Receiver<()>,
) -> Option<Box<dyn Link>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let Some(delay) = shared.policy.next_delay(attempt) else {
            tracing::info!(
                user_id = %link.user_id,
                attempts = attempt - 1,
                "Not reconnecting until the next explicit connect"
            );
            return None;
        };

        tracing::debug!(
            user_id = %link.user_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        tokio::select! {
            _ = &mut *close_rx => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        if !link.stay_connected() || link.transition(ConnectionState::Connecting).is_err() {
            return None;
        }

        let result = tokio::select! {
            _ = &mut *close_rx => {
                let _ = link.transition(ConnectionState::Disconnected);
                return None;
            }
            result = shared.open(&link.user_id) => result,
        };

        match result {
            Ok(mut conn) => {
                if link.transition(ConnectionState::Connected).is_err() {
                    let _ = conn.close().await;
                    return None;
                }
                tracing::info!(user_id = %link.user_id, attempt, "Transport reconnected");
                return Some(conn);
            }
            Err(e) => {
                tracing::warn!(user_id = %link.user_id, attempt, error = %e, "Reconnect failed");
                let _ = link.transition(ConnectionState::Disconnected);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Baseline, Classifier, HysteresisState};
    use crate::hub::{HubConfig, SensorUpdate};
    use crate::sensor::{ChannelReading, Sample};
    use crate::transport::{ExponentialBackoff, NoReconnect};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    /// How a mock server answers a registration
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    enum Reply {
        #[default]
        Ack,
        Reject,
        Silent,
    }

    struct MockLink {
        incoming: mpsc::UnboundedReceiver<String>,
        pending: VecDeque<String>,
        reply: Reply,
        sent: Arc<SyncMutex<Vec<String>>>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Link for MockLink {
        async fn send_text(&mut self, text: String) -> TransportResult<()> {
            if text.contains(r#""type":"register""#) {
                self.pending.push_back(
                    r#"{"type":"connection","status":"connected","message":"hi"}"#.to_string(),
                );
                match self.reply {
                    Reply::Ack => self.pending.push_back(
                        r#"{"type":"connection","status":"registered","message":"ok"}"#
                            .to_string(),
                    ),
                    Reply::Reject => self
                        .pending
                        .push_back(r#"{"type":"error","message":"userId is required"}"#.to_string()),
                    Reply::Silent => {}
                }
            }
            self.sent.lock().push(text);
            Ok(())
        }

        async fn recv_text(&mut self) -> Option<TransportResult<String>> {
            if let Some(text) = self.pending.pop_front() {
                return Some(Ok(text));
            }
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self) -> TransportResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockConnector {
        fail: AtomicBool,
        reply: SyncMutex<Reply>,
        attempts: AtomicUsize,
        peers: SyncMutex<Vec<mpsc::UnboundedSender<String>>>,
        sent: Arc<SyncMutex<Vec<String>>>,
        closed: Arc<AtomicUsize>,
    }

    impl MockConnector {
        fn push(&self, text: impl Into<String>) {
            let peers = self.peers.lock();
            peers.last().unwrap().send(text.into()).unwrap();
        }

        fn drop_peers(&self) {
            self.peers.lock().clear();
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, _url: &str) -> TransportResult<Box<dyn Link>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::Connect("refused".to_string()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.peers.lock().push(tx);
            Ok(Box::new(MockLink {
                incoming: rx,
                pending: VecDeque::new(),
                reply: *self.reply.lock(),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    fn manager(
        policy: Arc<dyn ReconnectPolicy>,
    ) -> (TransportManager, Arc<MockConnector>, Arc<FanoutHub>) {
        let connector = Arc::new(MockConnector::default());
        let hub = Arc::new(FanoutHub::new(HubConfig::default()));
        let manager = TransportManager::with_parts(
            &TransportConfig::default(),
            Arc::clone(&hub),
            connector.clone(),
            policy,
        );
        (manager, connector, hub)
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..300 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn update_json(user_id: &str) -> String {
        let sample = Sample::new(
            user_id,
            "watch",
            chrono::Utc::now(),
            ChannelReading::new(35.0, 90.0),
            ChannelReading::new(3.0, 90.0),
        );
        let analysis = Classifier::default()
            .classify(&sample, &Baseline::new(50.0, 2.0), None, HysteresisState::default())
            .analysis;
        serde_json::to_string(&ServerMessage::sensor_update(SensorUpdate::new(sample, analysis)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_registers_and_is_idempotent() {
        let (manager, connector, _hub) = manager(Arc::new(NoReconnect));

        manager.connect("alice").await.unwrap();
        manager.connect("alice").await.unwrap();

        assert_eq!(manager.state("alice"), ConnectionState::Connected);
        assert!(manager.is_connected("alice"));
        assert_eq!(connector.attempts(), 1);
        assert_eq!(
            *connector.sent.lock(),
            vec![r#"{"type":"register","userId":"alice"}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejected_registration_fails_connect() {
        let (manager, connector, _hub) = manager(Arc::new(NoReconnect));
        *connector.reply.lock() = Reply::Reject;

        let err = manager.connect("alice").await.unwrap_err();
        assert_eq!(err, TransportError::Rejected("userId is required".to_string()));
        assert_eq!(manager.state("alice"), ConnectionState::Disconnected);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unacknowledged_registration_times_out() {
        let connector = Arc::new(MockConnector::default());
        *connector.reply.lock() = Reply::Silent;
        let config = TransportConfig {
            connect_timeout_ms: 50,
            ..Default::default()
        };
        let manager = TransportManager::with_parts(
            &config,
            Arc::new(FanoutHub::new(HubConfig::default())),
            connector.clone(),
            Arc::new(NoReconnect),
        );

        let err = manager.connect("alice").await.unwrap_err();
        assert_eq!(err, TransportError::Timeout(50));
        assert!(!manager.is_connected("alice"));
    }

    #[tokio::test]
    async fn test_updates_reach_hub_and_bad_frames_are_dropped() {
        let (manager, connector, hub) = manager(Arc::new(NoReconnect));
        let received = Arc::new(SyncMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        hub.subscribe(move |update| {
            sink.lock().push(update.analysis.consecutive_readings);
            Ok(())
        })
        .unwrap();

        manager.connect("alice").await.unwrap();
        connector.push(r#"{"type":"connection","status":"registered","message":"ok"}"#);
        connector.push(update_json("alice"));
        connector.push("{not json");
        connector.push(r#"{"type":"mystery"}"#);
        connector.push(update_json("bob"));
        connector.push(update_json("alice"));

        wait_until(|| received.lock().len() == 2).await;
        assert!(manager.is_connected("alice"));
    }

    #[tokio::test]
    async fn test_server_stop_triggers_reregistration() {
        let (manager, connector, _hub) = manager(Arc::new(NoReconnect));
        manager.connect("alice").await.unwrap();

        connector.push(r#"{"type":"connection","status":"stopped","userId":"alice","message":"bye"}"#);
        wait_until(|| connector.sent.lock().len() == 2).await;

        let sent = connector.sent.lock().clone();
        assert_eq!(sent[0], sent[1]);
        assert!(manager.is_connected("alice"));
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_closes_and_clears_flag() {
        let (manager, connector, _hub) = manager(Arc::new(NoReconnect));
        manager.connect("alice").await.unwrap();

        manager.disconnect("alice").await;
        assert_eq!(manager.state("alice"), ConnectionState::Disconnected);
        assert!(!manager.should_stay_connected("alice"));
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);

        manager.disconnect("alice").await;
        manager.disconnect("nobody").await;
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_flag_set() {
        let (manager, connector, _hub) = manager(Arc::new(NoReconnect));
        connector.fail.store(true, Ordering::SeqCst);

        let err = manager.connect("alice").await.unwrap_err();
        assert_eq!(err, TransportError::Connect("refused".to_string()));
        assert_eq!(manager.state("alice"), ConnectionState::Disconnected);
        assert!(manager.should_stay_connected("alice"));

        connector.fail.store(false, Ordering::SeqCst);
        manager.connect("alice").await.unwrap();
        assert!(manager.is_connected("alice"));
    }

    #[tokio::test]
    async fn test_unexpected_close_without_policy_waits_for_connect() {
        let (manager, connector, _hub) = manager(Arc::new(NoReconnect));
        manager.connect("alice").await.unwrap();

        connector.drop_peers();
        wait_until(|| manager.state("alice") == ConnectionState::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connector.attempts(), 1);
        assert!(manager.should_stay_connected("alice"));

        manager.connect("alice").await.unwrap();
        assert_eq!(connector.attempts(), 2);
        assert!(manager.is_connected("alice"));
    }

    #[tokio::test]
    async fn test_backoff_reconnects_after_unexpected_close() {
        let policy = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(50), 3);
        let (manager, connector, _hub) = manager(Arc::new(policy));
        manager.connect("alice").await.unwrap();

        connector.drop_peers();
        wait_until(|| connector.attempts() == 2 && manager.is_connected("alice")).await;
        assert_eq!(connector.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_backoff_gives_up_after_max_attempts() {
        let policy = ExponentialBackoff::new(Duration::from_millis(5), Duration::from_millis(20), 3);
        let (manager, connector, _hub) = manager(Arc::new(policy));
        manager.connect("alice").await.unwrap();

        connector.fail.store(true, Ordering::SeqCst);
        connector.drop_peers();
        wait_until(|| connector.attempts() == 4).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(connector.attempts(), 4);
        assert_eq!(manager.state("alice"), ConnectionState::Disconnected);
        assert!(manager.should_stay_connected("alice"));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_reconnect() {
        let policy = ExponentialBackoff::new(Duration::from_secs(60), Duration::from_secs(60), 3);
        let (manager, connector, _hub) = manager(Arc::new(policy));
        manager.connect("alice").await.unwrap();

        connector.drop_peers();
        wait_until(|| manager.state("alice") == ConnectionState::Disconnected).await;

        tokio::time::timeout(Duration::from_secs(1), manager.disconnect("alice"))
            .await
            .unwrap();
        assert_eq!(connector.attempts(), 1);
        assert!(!manager.should_stay_connected("alice"));
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let (manager, connector, _hub) = manager(Arc::new(NoReconnect));
        manager.connect("alice").await.unwrap();
        manager.connect("bob").await.unwrap();

        manager.disconnect("alice").await;
        assert!(!manager.is_connected("alice"));
        assert!(manager.is_connected("bob"));
        assert_eq!(connector.attempts(), 2);

        manager.shutdown().await;
        assert!(!manager.is_connected("bob"));
    }
}
