//! # Biosense
//!
//! Real-time HRV/EDA monitoring with anxiety detection and streaming fan-out.
//!
//! ## Features
//!
//! - **Per-user sessions**: idempotent start/stop with a baseline fixed at start
//! - **Classification**: baseline deviation, rate of change and hysteresis
//! - **Fan-out**: every update reaches every listener; failing listeners are isolated
//! - **Streaming**: WebSocket plane on the server, reconnecting transport on the client
//!
//! ## Modules
//!
//! - [`session`]: Session registry and per-user state
//! - [`classifier`]: Anxiety classifier and baselines
//! - [`sensor`]: Samples and sample sources
//! - [`hub`]: Listener fan-out
//! - [`monitor`]: Sample pipeline tying the above together
//! - [`api`]: REST API server with Axum
//! - [`websocket`]: Streaming plane and wire messages
//! - [`transport`]: Client-side per-user streaming connections
//! - [`client`]: Consumer facade: start, stop, subscribe
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use biosense::classifier::Baseline;
//! use biosense::hub::{FanoutHub, HubConfig};
//! use biosense::monitor::{MonitorConfig, MonitorService};
//! use biosense::sensor::{ChannelReading, Sample};
//! use biosense::session::SessionConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Arc::new(FanoutHub::new(HubConfig::default()));
//!     let monitor = Arc::new(MonitorService::new(MonitorConfig::default(), hub, None));
//!
//!     monitor.subscribe(|update| {
//!         println!("{}: anxious={}", update.user_id(), update.analysis.is_anxious);
//!         Ok(())
//!     })?;
//!
//!     let config = SessionConfig::new("user-1", 1.0).baseline(Baseline::new(50.0, 2.0));
//!     monitor.start(config).await?;
//!
//!     let sample = Sample::new(
//!         "user-1",
//!         "watch",
//!         chrono::Utc::now(),
//!         ChannelReading::new(35.0, 95.0),
//!         ChannelReading::new(3.0, 95.0),
//!     );
//!     monitor.ingest(sample).await?;
//!
//!     monitor.stop("user-1").await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod classifier;
pub mod client;
pub mod config;
pub mod hub;
pub mod logging;
pub mod monitor;
pub mod sensor;
pub mod session;
pub mod transport;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use classifier::{AnxietyAnalysis, Baseline, Classifier, ClassifierConfig, Severity};

pub use client::{ClientConfig, ClientError, MonitorClient};

pub use config::{Config, ConfigError, LoggingConfig};

pub use hub::{FanoutHub, HubConfig, HubError, ListenerError, SensorUpdate, Subscription};

pub use monitor::{MonitorConfig, MonitorError, MonitorService};

pub use sensor::{ChannelReading, Sample};

pub use session::{SessionConfig, SessionError, SessionSnapshot};

pub use transport::{ConnectionState, TransportConfig, TransportError, TransportManager};

pub use websocket::{ClientMessage, ServerMessage};
