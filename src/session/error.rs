//! Session error types

use thiserror::Error;

/// Errors raised by the session registry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The session configuration was rejected
    #[error("Invalid session config: {0}")]
    Validation(String),

    /// No session exists for the user
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
