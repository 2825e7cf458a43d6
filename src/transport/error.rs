//! Transport error types

use thiserror::Error;

/// Errors that can occur when talking to the analytics API
#[derive(Error, Debug)]
pub enum TransportError {
    /// Server could not be reached
    #[error("API unavailable")]
    Unavailable,

    /// Request did not complete within the client timeout
    #[error("Request timeout")]
    Timeout,

    /// Underlying HTTP client failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with an error envelope or a non-success status
    #[error("{name} ({status}): {message}")]
    Api {
        status: u16,
        name: String,
        message: String,
    },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}

impl TransportError {
    /// Classify a reqwest failure the same way for every request
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Unavailable
        } else {
            TransportError::Request(err)
        }
    }
}
