//! Monitor client facade
//!
//! `start` asks the server to begin a session and then opens the user's
//! streaming connection; updates received on it are broadcast through this
//! client's own hub. `stop` tears the stream down first, drops the user's
//! listeners and then stops the server session.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::error::ClientError;
use crate::api::dto::{HealthResponse, SessionListResponse, StartResponse, StopRequest, StopResponse};
use crate::classifier::AnxietyAnalysis;
use crate::hub::{FanoutHub, HubConfig, ListenerError, SensorUpdate, Subscription};
use crate::sensor::Sample;
use crate::session::{SessionConfig, SessionSnapshot};
use crate::transport::{ConnectionState, TransportConfig, TransportManager};

/// Control-plane client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the monitor server
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8082".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Consumer-side entry point: control plus subscription
pub struct MonitorClient {
    http: Client,
    base_url: String,
    transport: TransportManager,
}

impl MonitorClient {
    /// Create a client streaming over WebSockets
    pub fn new(
        config: &ClientConfig,
        transport: &TransportConfig,
        hub: HubConfig,
    ) -> Result<Self, ClientError> {
        let hub = Arc::new(FanoutHub::new(hub));
        Self::with_transport(config, TransportManager::new(transport, hub))
    }

    /// Create a client around an existing transport
    pub fn with_transport(
        config: &ClientConfig,
        transport: TransportManager,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(ClientError::from_request);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_body(status.as_u16(), &body))
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(ClientError::from_request)?;
        Self::read(response).await
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T, ClientError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ClientError::from_request)?;
        Self::read(response).await
    }

    /// Open the user's stream and start monitoring.
    ///
    /// The stream is registered before the session starts, so the first
    /// sample already reaches this client. A stream that fails to open is
    /// logged and leaves the session running without updates;
    /// [`connection_state`](Self::connection_state) reports it and the next
    /// `start` retries.
    pub async fn start(&self, config: &SessionConfig) -> Result<StartResponse, ClientError> {
        let was_connected = self.transport.is_connected(&config.user_id);
        if let Err(e) = self.transport.connect(&config.user_id).await {
            tracing::warn!(
                user_id = %config.user_id,
                error = %e,
                "Stream not connected; session updates will not be received"
            );
        }

        let response: StartResponse = match self.post("/sensors/start", config).await {
            Ok(response) => response,
            Err(e) => {
                if !was_connected {
                    self.transport.disconnect(&config.user_id).await;
                }
                return Err(e);
            }
        };

        tracing::info!(user_id = %config.user_id, status = %response.status, "Monitoring started");
        Ok(response)
    }

    /// Close the stream, drop the user's listeners and stop the session
    pub async fn stop(&self, user_id: &str) -> Result<StopResponse, ClientError> {
        self.transport.disconnect(user_id).await;
        self.hub().clear_user(user_id);

        let response: StopResponse = self
            .post(
                "/sensors/stop",
                &StopRequest {
                    user_id: user_id.to_string(),
                },
            )
            .await?;
        tracing::info!(user_id = %user_id, status = %response.status, "Monitoring stopped");
        Ok(response)
    }

    /// Server-side snapshot of a session
    pub async fn status(&self, user_id: &str) -> Result<SessionSnapshot, ClientError> {
        self.get(self.url(&format!("/sensors/{}", urlencoding::encode(user_id))))
            .await
    }

    /// All active sessions on the server
    pub async fn sessions(&self) -> Result<SessionListResponse, ClientError> {
        self.get(self.url("/sensors")).await
    }

    /// Push a sample through the server pipeline
    pub async fn ingest(&self, sample: &Sample) -> Result<AnxietyAnalysis, ClientError> {
        self.post("/sensors/samples", sample).await
    }

    /// Server health
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.get(format!("{}/health", self.base_url)).await
    }

    /// Receive every streamed update
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription, ClientError>
    where
        F: Fn(&SensorUpdate) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Ok(self.hub().subscribe(callback)?)
    }

    /// Receive one user's updates until that user is stopped
    pub fn subscribe_user<F>(&self, user_id: &str, callback: F) -> Result<Subscription, ClientError>
    where
        F: Fn(&SensorUpdate) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Ok(self.hub().subscribe_user(user_id, callback)?)
    }

    /// Remove a listener
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.hub().unsubscribe(subscription)
    }

    /// State of the user's stream
    pub fn connection_state(&self, user_id: &str) -> ConnectionState {
        self.transport.state(user_id)
    }

    /// The client-side hub
    pub fn hub(&self) -> &Arc<FanoutHub> {
        self.transport.hub()
    }

    /// Close every stream
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}
