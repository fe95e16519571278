//! Transport error types

use thiserror::Error;

use super::state::ConnectionState;

/// Errors raised by the streaming transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Opening the connection failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Opening the connection took too long
    #[error("Connection timed out after {0}ms")]
    Timeout(u64),

    /// Writing a frame failed
    #[error("Send failed: {0}")]
    Send(String),

    /// The server refused the registration
    #[error("Registration rejected: {0}")]
    Rejected(String),

    /// Reading a frame failed
    #[error("Receive failed: {0}")]
    Receive(String),

    /// A message could not be encoded
    #[error("Encoding error: {0}")]
    Encode(String),

    /// The connection is not in a state that allows the operation
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The connection was torn down while the operation was in progress
    #[error("Connection stopped")]
    Stopped,
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
