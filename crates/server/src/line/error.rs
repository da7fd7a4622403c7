//! LINE-related errors.

use thiserror::Error;

/// Errors that can occur when talking to the LINE Messaging API.
#[derive(Debug, Error)]
pub enum LineError {
    /// HTTP request failed or timed out.
    #[error("LINE request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// LINE answered with a non-success status.
    #[error("LINE API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to build the request URL.
    #[error("LINE configuration error: {0}")]
    Config(String),
}

impl LineError {
    /// Whether the failure is a timeout of the outbound request.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_timeout())
    }
}
