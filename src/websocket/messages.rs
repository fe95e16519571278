//! WebSocket Message Types
//!
//! Wire format shared by the server handler and the client transport.
//! Every message is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::hub::SensorUpdate;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Bind this connection to one user's updates
    #[serde(rename_all = "camelCase")]
    Register { user_id: String },
    /// Keepalive
    Ping,
    /// Any type this build does not know
    #[serde(other)]
    Unknown,
}

/// Connection status reported in `connection` messages
pub mod status {
    pub const CONNECTED: &str = "connected";
    pub const REGISTERED: &str = "registered";
    /// The user's session was stopped; the registration is gone
    pub const STOPPED: &str = "stopped";
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Connection acknowledgement
    #[serde(rename_all = "camelCase")]
    Connection {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        message: String,
    },
    /// A processed sample and its analysis
    SensorUpdate { data: SensorUpdate },
    /// Pong response to ping
    Pong,
    /// Error message
    Error { message: String },
    /// Any type this build does not know
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Wrap an update for the wire
    pub fn sensor_update(update: SensorUpdate) -> Self {
        ServerMessage::SensorUpdate { data: update }
    }

    /// Error message with the given text
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
