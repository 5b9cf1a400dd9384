//! Error type for source host calls.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    /// Transport failure before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// Any non-success status without a dedicated variant.
    #[error("host returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("credential rejected by host")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    /// Stale revision marker on write (HTTP 409 / 422).
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("could not decode host response: {0}")]
    Decode(String),

    #[error("host call timed out")]
    Timeout,
}

impl From<reqwest::Error> for HostError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HostError::Timeout
        } else if e.is_decode() {
            HostError::Decode(e.to_string())
        } else {
            HostError::Http(e)
        }
    }
}
