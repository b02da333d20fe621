//! Error types for notesync
//!
//! This module provides the error taxonomy shared by every orchestration primitive:
//! - Retry classification (rate-limited, transient, permanent)
//! - Terminal outcomes of bounded loops (retries exhausted, job failed, job timed out)
//! - Machine-readable error codes so callers never see an untagged failure

use std::time::Duration;
use thiserror::Error;

/// Result type alias for notesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for notesync
///
/// Every public operation returns either a success value or one of these variants.
/// Each variant maps to a stable code via [`Error::error_code`].
#[derive(Debug, Error)]
pub enum Error {
    /// The server signalled a request-rate violation
    #[error("rate limited by server (retry after {retry_after:?})")]
    RateLimited {
        /// Wait suggested by the server, if it supplied one
        retry_after: Option<Duration>,
    },

    /// Connection failure, timeout or 5xx response
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Request rejected (4xx other than rate limiting) or response malformed
    #[error("request rejected: {message}")]
    PermanentRequest {
        /// HTTP status, when the failure came from a response
        status: Option<u16>,
        /// Human-readable reason
        message: String,
    },

    /// The attempt bound was reached while failures were still retryable
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of calls made
        attempts: u32,
        /// The failure observed on the final attempt
        last_error: Box<Error>,
    },

    /// The server-side job reached its failed state
    #[error("job {job_id} failed: {reason}")]
    JobFailed {
        /// Job identifier issued by the start call
        job_id: String,
        /// Reason reported by the server
        reason: String,
    },

    /// The poll bound was reached without a terminal job status
    #[error("job {job_id} did not finish after {attempts} polls")]
    JobTimedOut {
        /// Job identifier issued by the start call
        job_id: String,
        /// Number of status polls performed
        attempts: u32,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "proxy.concurrency")
        key: Option<String>,
    },

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the retry executor treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Sleep for the suggested wait (or the configured default), then retry
    RateLimited(Option<Duration>),
    /// Retry immediately
    Transient,
    /// Fail without retrying
    Permanent,
}

impl Error {
    /// Classify this error for retry purposes
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Error::RateLimited { retry_after } => FailureClass::RateLimited(*retry_after),
            Error::TransientNetwork(_) => FailureClass::Transient,
            // I/O errors can be transient in the same cases a socket error would be
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe => FailureClass::Transient,
                _ => FailureClass::Permanent,
            },
            Error::PermanentRequest { .. }
            | Error::RetriesExhausted { .. }
            | Error::JobFailed { .. }
            | Error::JobTimedOut { .. }
            | Error::Config { .. }
            | Error::Cancelled
            | Error::Serialization(_) => FailureClass::Permanent,
        }
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::RateLimited { .. } => "rate_limited",
            Error::TransientNetwork(_) => "transient_network",
            Error::PermanentRequest { .. } => "permanent_request",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::JobFailed { .. } => "job_failed",
            Error::JobTimedOut { .. } => "job_timed_out",
            Error::Config { .. } => "config_error",
            Error::Cancelled => "cancelled",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
        }
    }

    /// Shorthand for a permanent failure that did not come from an HTTP status
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Error::PermanentRequest {
            status: None,
            message: message.into(),
        }
    }
}
