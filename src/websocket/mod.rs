//! WebSocket Streaming Plane
//!
//! Streams sensor updates to clients over WebSocket.
//!
//! ## Protocol
//!
//! Clients connect to `/api/v1/ws`, receive a `connection` acknowledgement and
//! then register for one user:
//!
//! ```text
//! -> {"type":"register","userId":"user-1"}
//! <- {"type":"connection","status":"registered","userId":"user-1","message":"..."}
//! <- {"type":"sensorUpdate","data":{"sensorData":{...},"analysis":{...}}}
//! ```
//!
//! `{"type":"ping"}` is answered with `{"type":"pong"}`. Unknown message types
//! are logged and ignored.

mod handler;
mod messages;

pub use handler::websocket_handler;
pub use messages::{status, ClientMessage, ServerMessage};
