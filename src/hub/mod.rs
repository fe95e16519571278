//! Fan-out Hub
//!
//! Delivers each processed sample, paired with its analysis, to every
//! registered listener. Listeners are isolated from each other: one failing or
//! panicking never blocks delivery to the rest.

mod fanout;
mod listener;

pub use fanout::{BroadcastReport, FanoutHub, HubConfig, HubError, ReleaseHook, Subscription};
pub use listener::{
    ErrorSink, Listener, ListenerError, ListenerFailure, ListenerScope, SensorUpdate,
    TracingErrorSink,
};
