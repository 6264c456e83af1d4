//! Error types for the Hedra client.

use thiserror::Error;

/// Result type for Hedra client operations.
pub type Result<T> = std::result::Result<T, HedraError>;

/// Hedra client errors.
#[derive(Debug, Error)]
pub enum HedraError {
    /// Transport-level failure (connection, timeout, TLS).
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx API response.
    #[error("Hedra API error {status}: {message}")]
    Api { status: u16, message: String },

    /// A generation reached a terminal failure state.
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

impl HedraError {
    /// HTTP status of the failing response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            HedraError::Request(err) => err.status().map(|s| s.as_u16()),
            HedraError::Api { status, .. } => Some(*status),
            HedraError::GenerationFailed(_) => None,
        }
    }
}
