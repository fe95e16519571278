//! Monitor Client
//!
//! Consumer facade over the control plane and the streaming transport:
//! `start(config)`, `stop(user_id)` and `subscribe(callback)`.

mod error;
mod monitor;

pub use error::ClientError;
pub use monitor::{ClientConfig, MonitorClient};
