//! End-to-end streaming tests: a real server on an ephemeral port, driven by
//! the client facade over WebSockets.

use biosense::api::{serve_with_shutdown, ApiConfig, AppState};
use biosense::classifier::Baseline;
use biosense::client::{ClientConfig, MonitorClient};
use biosense::hub::{FanoutHub, HubConfig, SensorUpdate};
use biosense::monitor::{MonitorConfig, MonitorService};
use biosense::sensor::{ChannelReading, Sample, SimulatedSourceFactory, SimulationConfig, SourceFactory};
use biosense::session::SessionConfig;
use biosense::transport::{ConnectionState, TransportConfig};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(sources: Option<Arc<dyn SourceFactory>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let hub = Arc::new(FanoutHub::new(HubConfig::default()));
        let monitor = Arc::new(MonitorService::new(MonitorConfig::default(), hub, sources));
        let state = AppState::new(monitor, ApiConfig::new("127.0.0.1", addr.port()));

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            serve_with_shutdown(listener, state, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
        });

        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    fn client(&self) -> MonitorClient {
        let client = ClientConfig {
            base_url: format!("http://{}", self.addr),
            request_timeout_ms: 5_000,
        };
        let transport = TransportConfig {
            url: format!("ws://{}/api/v1/ws", self.addr),
            connect_timeout_ms: 5_000,
            ..Default::default()
        };
        MonitorClient::new(&client, &transport, HubConfig::default()).unwrap()
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

fn sample(user: &str, seconds: i64, hrv: f64, eda: f64) -> Sample {
    Sample::new(
        user,
        "e2e",
        chrono::Utc::now() + chrono::Duration::seconds(seconds),
        ChannelReading::new(hrv, 95.0),
        ChannelReading::new(eda, 95.0),
    )
}

/// Wait until the server reports `expected` registered listeners
async fn wait_for_listeners(client: &MonitorClient, expected: usize) {
    for _ in 0..100 {
        if client.health().await.unwrap().listeners == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server never reached {} listeners", expected);
}

async fn next_update(rx: &mut mpsc::UnboundedReceiver<SensorUpdate>) -> SensorUpdate {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an update")
        .expect("update channel closed")
}

#[tokio::test]
async fn test_updates_stream_to_subscribers() {
    let server = TestServer::start(None).await;
    let client = server.client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .subscribe_user("alice", move |update| {
            let _ = tx.send(update.clone());
            Ok(())
        })
        .unwrap();

    let config = SessionConfig::new("alice", 1.0).baseline(Baseline::new(50.0, 2.0));
    let started = client.start(&config).await.unwrap();
    assert_eq!(started.status, "started");
    assert_eq!(client.connection_state("alice"), ConnectionState::Connected);

    let again = client.start(&config).await.unwrap();
    assert_eq!(again.status, "already_active");
    assert_eq!(again.session.started_at, started.session.started_at);

    wait_for_listeners(&client, 1).await;

    for i in 0..3 {
        client.ingest(&sample("alice", i, 35.0, 3.0)).await.unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(next_update(&mut rx).await);
    }
    assert!(received.iter().all(|u| u.user_id() == "alice"));
    assert_eq!(
        received
            .iter()
            .map(|u| u.analysis.consecutive_readings)
            .collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(!received[1].analysis.is_anxious);
    assert!(received[2].analysis.is_anxious);
    assert!(received[2].analysis.severity.is_some());

    let stopped = client.stop("alice").await.unwrap();
    assert_eq!(stopped.status, "stopped");
    assert_eq!(client.connection_state("alice"), ConnectionState::Disconnected);
    assert_eq!(client.hub().user_listener_count("alice"), 0);

    let again = client.stop("alice").await.unwrap();
    assert_eq!(again.status, "not_active");

    client.shutdown().await;
    server.stop().await;
}

#[tokio::test]
async fn test_users_receive_only_their_updates() {
    let server = TestServer::start(None).await;
    let client = server.client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .subscribe(move |update| {
            let _ = tx.send(update.clone());
            Ok(())
        })
        .unwrap();

    for user in ["alice", "bob"] {
        client.start(&SessionConfig::new(user, 1.0)).await.unwrap();
    }
    wait_for_listeners(&client, 2).await;

    client.ingest(&sample("bob", 0, 50.0, 2.0)).await.unwrap();
    client.ingest(&sample("alice", 0, 50.0, 2.0)).await.unwrap();

    let mut users = vec![
        next_update(&mut rx).await.user_id().to_string(),
        next_update(&mut rx).await.user_id().to_string(),
    ];
    users.sort();
    assert_eq!(users, vec!["alice", "bob"]);

    // each stream forwards only its own user, so nothing is duplicated
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    client.stop("alice").await.unwrap();
    client.stop("bob").await.unwrap();
    client.shutdown().await;
    server.stop().await;
}

#[tokio::test]
async fn test_simulated_session_streams_in_order() {
    let simulation = SimulationConfig {
        episode_probability: 0.0,
        dropout_probability: 0.0,
        seed: Some(11),
        ..Default::default()
    };
    let factory: Arc<dyn SourceFactory> = Arc::new(SimulatedSourceFactory::new(simulation));
    let server = TestServer::start(Some(factory)).await;
    let client = server.client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .subscribe_user("sim", move |update| {
            let _ = tx.send(update.clone());
            Ok(())
        })
        .unwrap();

    // 10 Hz for one second: exactly ten samples, none lost to stream setup
    let config = SessionConfig::new("sim", 10.0).simulation_duration(1.0);
    client.start(&config).await.unwrap();

    let mut received = Vec::new();
    for _ in 0..10 {
        received.push(next_update(&mut rx).await);
    }
    assert!(received
        .windows(2)
        .all(|pair| pair[0].sensor_data.timestamp < pair[1].sensor_data.timestamp));
    assert!(received.iter().all(|u| !u.analysis.is_anxious));

    let mut ended = false;
    for _ in 0..100 {
        match client.status("sim").await {
            Err(err) if err.is_not_found() => {
                ended = true;
                break;
            }
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    assert!(ended, "simulated session never ended");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());

    client.shutdown().await;
    server.stop().await;
}

#[tokio::test]
async fn test_stream_survives_restart_by_another_client() {
    let server = TestServer::start(None).await;
    let watcher = server.client();
    let controller = server.client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher
        .subscribe_user("shared", move |update| {
            let _ = tx.send(update.clone());
            Ok(())
        })
        .unwrap();
    watcher
        .start(&SessionConfig::new("shared", 1.0))
        .await
        .unwrap();
    wait_for_listeners(&watcher, 1).await;

    let stopped = controller.stop("shared").await.unwrap();
    assert_eq!(stopped.status, "stopped");
    // the watcher re-registers on the stop notification
    wait_for_listeners(&controller, 1).await;
    assert_eq!(watcher.connection_state("shared"), ConnectionState::Connected);

    let restarted = controller
        .start(&SessionConfig::new("shared", 1.0))
        .await
        .unwrap();
    assert_eq!(restarted.status, "started");
    wait_for_listeners(&controller, 2).await;

    controller
        .ingest(&sample("shared", 0, 50.0, 2.0))
        .await
        .unwrap();
    let update = next_update(&mut rx).await;
    assert_eq!(update.user_id(), "shared");

    controller.stop("shared").await.unwrap();
    watcher.shutdown().await;
    controller.shutdown().await;
    server.stop().await;
}

#[tokio::test]
async fn test_wire_protocol() {
    let server = TestServer::start(None).await;
    let url = format!("ws://{}/api/v1/ws", server.addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    async fn next_json(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> serde_json::Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "connection");
    assert_eq!(ack["status"], "connected");

    ws.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "pong");

    ws.send(Message::Text(r#"{"type":"subscribeAll"}"#.into())).await.unwrap();
    ws.send(Message::Text(r#"{"type":"register","userId":"carol"}"#.into()))
        .await
        .unwrap();
    let registered = next_json(&mut ws).await;
    assert_eq!(registered["type"], "connection");
    assert_eq!(registered["status"], "registered");
    assert_eq!(registered["userId"], "carol");

    ws.close(None).await.unwrap();
    server.stop().await;
}
