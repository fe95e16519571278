//! Client error types

use serde::Deserialize;
use thiserror::Error;

use crate::hub::HubError;
use crate::transport::TransportError;

/// Errors returned by [`MonitorClient`](super::MonitorClient)
#[derive(Error, Debug)]
pub enum ClientError {
    /// The monitor server could not be reached
    #[error("Monitor server unavailable: {0}")]
    Unavailable(String),

    /// The request timed out
    #[error("Request timeout")]
    Timeout,

    /// The HTTP request failed
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server rejected the request
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The streaming transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Listener registration failed
    #[error(transparent)]
    Hub(#[from] HubError),
}

impl ClientError {
    /// Classify a reqwest error the way callers care about
    pub(crate) fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_connect() {
            ClientError::Unavailable(err.to_string())
        } else {
            ClientError::Request(err)
        }
    }

    /// Build an API error from a non-success response body
    pub(crate) fn from_body(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            error: Detail,
        }
        #[derive(Deserialize)]
        struct Detail {
            code: String,
            message: String,
        }

        match serde_json::from_str::<Envelope>(body) {
            Ok(envelope) => ClientError::Api {
                status,
                code: envelope.error.code,
                message: envelope.error.message,
            },
            Err(_) => ClientError::Api {
                status,
                code: "UNKNOWN".to_string(),
                message: body.to_string(),
            },
        }
    }

    /// Whether the server answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }
}
