//! Session Registry
//!
//! Per-user session state: baseline, last reading, hysteresis counters and
//! lifecycle. One record exists per active user; starting an active user
//! returns the existing record and stopping an unknown user is a no-op.

mod error;
mod registry;
mod state;

pub use error::{SessionError, SessionResult};
pub use registry::{SessionHandle, SessionRegistry, StartOutcome};
pub use state::{SessionConfig, SessionLimits, SessionSnapshot, UserState};
