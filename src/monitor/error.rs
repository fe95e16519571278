//! Monitor service errors

use thiserror::Error;

use crate::hub::HubError;
use crate::session::SessionError;

/// Errors returned by [`MonitorService`](super::MonitorService)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    /// Session validation or lookup failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Listener registration failed
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;
