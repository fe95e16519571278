//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.

use serde::{Deserialize, Serialize};

use crate::session::SessionSnapshot;

/// Status strings of control-plane responses
pub mod status {
    pub const STARTED: &str = "started";
    pub const ALREADY_ACTIVE: &str = "already_active";
    pub const STOPPED: &str = "stopped";
    pub const NOT_ACTIVE: &str = "not_active";
}

/// Response to `POST /sensors/start`
#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    /// "started" or "already_active"
    pub status: String,
    pub session: SessionSnapshot,
}

/// Body of `POST /sensors/stop`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub user_id: String,
}

/// Response to `POST /sensors/stop`
#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    /// "stopped" or "not_active"
    pub status: String,
    /// Final state of the stopped session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSnapshot>,
}

/// Response to `GET /sensors`
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSnapshot>,
    pub count: usize,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy"
    pub status: String,
    /// Number of active sessions
    pub active_sessions: usize,
    /// Registered stream listeners
    pub listeners: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: String,
}
