//! Rate-limit aware retry logic
//!
//! This module wraps a single remote call and re-issues it according to how the
//! failure is classified:
//!
//! - **Rate limited**: sleep for the server-suggested wait (or the configured default),
//!   then retry
//! - **Transient** (connection failure, timeout, 5xx): retry immediately
//! - **Permanent** (other 4xx, malformed response): fail immediately
//!
//! Every call counts against `max_attempts`. Running out of attempts yields
//! [`Error::RetriesExhausted`], which callers can tell apart from a permanent rejection.
//!
//! # Example
//!
//! ```no_run
//! use notesync::config::RetryConfig;
//! use notesync::retry::RetryExecutor;
//!
//! # async fn example() -> notesync::Result<()> {
//! let executor = RetryExecutor::new(RetryConfig::default());
//! let body = executor
//!     .execute(|| async {
//!         // Your remote call here
//!         Ok::<_, notesync::Error>("payload".to_string())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, FailureClass, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Executes operations with bounded, classification-driven retries
///
/// Purely sequential from the caller's point of view: one call is in flight at a time.
#[derive(Clone, Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    cancel: CancellationToken,
}

impl RetryExecutor {
    /// Create an executor that is never cancelled
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token; cancelling it aborts in-flight calls and sleeps
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The retry configuration in use
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The cancellation token observed by this executor
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `operation` with the configured `max_attempts`
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_attempts(self.config.max_attempts, operation)
            .await
    }

    /// Run `operation`, making at most `max_attempts` calls
    ///
    /// A `max_attempts` of zero is treated as one.
    pub async fn execute_with_attempts<F, Fut, T>(
        &self,
        max_attempts: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                outcome = operation() => outcome,
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let wait = match error.failure_class() {
                FailureClass::Permanent => {
                    tracing::error!(
                        error = %error,
                        attempt = attempt,
                        "Operation failed with non-retryable error"
                    );
                    return Err(error);
                }
                FailureClass::Transient => Duration::ZERO,
                FailureClass::RateLimited(suggested) => self.rate_limit_wait(suggested),
            };

            if attempt >= max_attempts {
                tracing::error!(
                    error = %error,
                    attempts = attempt,
                    "Operation failed after all retry attempts exhausted"
                );
                return Err(Error::RetriesExhausted {
                    attempts: attempt,
                    last_error: Box::new(error),
                });
            }

            tracing::warn!(
                error = %error,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = wait.as_millis(),
                "Operation failed, retrying"
            );

            if !wait.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }

    /// Wait to apply after a rate-limited response
    ///
    /// Uses the server's suggestion when present, capped at `max_rate_limit_wait`.
    fn rate_limit_wait(&self, suggested: Option<Duration>) -> Duration {
        suggested
            .unwrap_or(self.config.default_rate_limit_wait)
            .min(self.config.max_rate_limit_wait)
    }
}
