//! Common test utilities for notesync integration tests

use notesync::{RetryConfig, RetryExecutor, UploadConfig};
use std::time::Duration;

/// Executor with short rate-limit waits so wiremock round trips stay fast
#[allow(dead_code)]
pub fn fast_executor() -> RetryExecutor {
    RetryExecutor::new(RetryConfig {
        max_attempts: 3,
        default_rate_limit_wait: Duration::from_millis(10),
        max_rate_limit_wait: Duration::from_millis(50),
        request_timeout: Duration::from_secs(5),
    })
}

/// Upload settings with a short poll interval
#[allow(dead_code)]
pub fn fast_upload(max_poll_attempts: u32) -> UploadConfig {
    UploadConfig {
        max_poll_attempts,
        poll_interval: Duration::from_millis(10),
        batch_workers: 3,
    }
}
