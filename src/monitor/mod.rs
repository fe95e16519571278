//! Monitor Service
//!
//! Server-side composition of the session registry, the classifier, the
//! sample sources and the fan-out hub.

mod error;
mod service;

pub use error::{MonitorError, MonitorResult};
pub use service::{MonitorConfig, MonitorService, SessionStart};
