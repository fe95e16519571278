//! Streaming Transport
//!
//! Client side of the streaming plane. [`TransportManager`] keeps one
//! connection per user through the states
//! `Disconnected -> Connecting -> Connected -> Disconnected`, with `Stopping`
//! during teardown. A "should stay connected" flag gates reconnection; the
//! pluggable [`ReconnectPolicy`] decides whether an unexpected close is
//! retried.

mod backoff;
mod connector;
mod error;
mod manager;
mod state;

pub use backoff::{ExponentialBackoff, NoReconnect, ReconnectConfig, ReconnectPolicy};
pub use connector::{Connector, Link, WsConnector, WsLink};
pub use error::{TransportError, TransportResult};
pub use manager::{TransportConfig, TransportManager};
pub use state::ConnectionState;
