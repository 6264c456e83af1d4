//! Typed errors for the media pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on the failure class. The taxonomy mirrors how failures are handled:
//! precondition failures never reach a vendor, transient provider failures
//! are retried, permanent ones fail the job, and hand-off failures degrade
//! instead of discarding finished vendor output.

use thiserror::Error;
use uuid::Uuid;

use crate::types::job::{StageKind, VideoStatus};

/// Maximum length of an error message persisted to the job record or
/// returned to a client. Vendor payloads can be arbitrarily large.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Truncate an error message to [`MAX_ERROR_MESSAGE_LEN`] characters.
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        return message.to_string();
    }
    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

/// Classification of an error as retryable or permanent.
///
/// Implemented by every error type that flows through the backoff retrier,
/// so the retrier stays vendor-agnostic: each adapter classifies its own
/// wire signals when constructing the error.
pub trait RetryClass {
    fn is_retryable(&self) -> bool;
}

/// Error from an external capability (TTS, avatar, render, blob vendor).
///
/// Adapters set `retryable` from their own wire signals (HTTP 429/502/503/
/// 504, transport timeouts). Everything else is permanent.
#[derive(Debug, Clone, Error)]
#[error("{provider} error: {message}")]
pub struct ProviderError {
    /// Provider key, e.g. "cartesia", "hedra", "remotion".
    pub provider: String,
    /// HTTP status when the failure came from a response.
    pub status: Option<u16>,
    /// Whether the failure is a rate-limit/transient-unavailability signal.
    pub retryable: bool,
    pub message: String,
}

impl ProviderError {
    /// A permanent provider failure (bad input, auth, hard quota).
    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: None,
            retryable: false,
            message: message.into(),
        }
    }

    /// A transient failure worth retrying (vendor briefly unavailable).
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: None,
            retryable: true,
            message: message.into(),
        }
    }

    /// Classify an HTTP response status. 429 and 502/503/504 are the
    /// rate-limit / transient-unavailability signals; all else is permanent.
    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: Some(status),
            retryable: matches!(status, 429 | 502 | 503 | 504),
            message: message.into(),
        }
    }
}

impl RetryClass for ProviderError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Blob store failure. Kept separate from [`ProviderError`] because the
/// blob store is our own storage, not a rate-limited generation vendor.
#[derive(Debug, Clone, Error)]
#[error("blob storage error during {op}: {message}")]
pub struct BlobError {
    /// Operation that failed: "put", "signed_url", "fetch", ...
    pub op: &'static str,
    pub message: String,
}

impl BlobError {
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// Errors raised by the pipeline core.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Job record does not exist.
    #[error("job {job_id} not found")]
    JobNotFound { job_id: Uuid },

    /// A stage was asked to run without its required prior artifact.
    /// Fails immediately; no vendor call is made.
    #[error("{stage} stage precondition failed: {missing}")]
    Precondition {
        stage: StageKind,
        missing: &'static str,
    },

    /// The job was cancelled; no stage or poller may act on it.
    #[error("job {job_id} is cancelled")]
    Cancelled { job_id: Uuid },

    /// A status write that would move the job backwards or out of a
    /// terminal state.
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: VideoStatus,
        to: VideoStatus,
    },

    /// A stage entry point was invoked while the job is in a status it
    /// cannot serve (e.g. rendering a job that never generated audio).
    #[error("{stage} stage cannot run while job is {status:?}")]
    WrongStatus {
        stage: StageKind,
        status: VideoStatus,
    },

    /// External capability failure, already classified by the adapter.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Blob store failure.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// Job store failure (connection, serialization).
    #[error("job store error: {0}")]
    Store(String),
}

impl RetryClass for PipelineError {
    fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Provider(e) => e.retryable,
            _ => false,
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_classification() {
        assert!(ProviderError::http("cartesia", 429, "rate limited").retryable);
        assert!(ProviderError::http("cartesia", 503, "unavailable").retryable);
        assert!(ProviderError::http("cartesia", 502, "bad gateway").retryable);
        assert!(!ProviderError::http("cartesia", 400, "bad voice id").retryable);
        assert!(!ProviderError::http("cartesia", 401, "bad key").retryable);
    }

    #[test]
    fn truncation_bounds_vendor_payloads() {
        let long = "x".repeat(10_000);
        assert_eq!(truncate_error(&long).chars().count(), MAX_ERROR_MESSAGE_LEN);
        assert_eq!(truncate_error("out of memory"), "out of memory");
    }

    #[test]
    fn only_provider_errors_are_retryable() {
        let e = PipelineError::Provider(ProviderError::transient("hedra", "busy"));
        assert!(e.is_retryable());

        let e = PipelineError::Precondition {
            stage: StageKind::AvatarGeneration,
            missing: "audio_output",
        };
        assert!(!e.is_retryable());
    }
}
