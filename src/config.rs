//! Configuration types for notesync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
///
/// Every limit the orchestration primitives use is carried here and passed in
/// explicitly; nothing is read from process-wide state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Retry behavior for every remote call
    #[serde(default)]
    pub retry: RetryConfig,

    /// Cursor pagination limits
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Proxy screening limits
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// File import polling limits
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Config {
    /// Parse a JSON document and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a bounded loop never run
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str, &str); 6] = [
            (
                self.retry.max_attempts == 0,
                "retry.max_attempts",
                "must allow at least one attempt",
            ),
            (
                self.pagination.max_empty_pages == 0,
                "pagination.max_empty_pages",
                "must tolerate at least one empty page",
            ),
            (
                self.proxy.sample_size == 0,
                "proxy.sample_size",
                "must sample at least one candidate",
            ),
            (
                self.proxy.concurrency == 0,
                "proxy.concurrency",
                "must allow at least one in-flight check",
            ),
            (
                self.upload.max_poll_attempts == 0,
                "upload.max_poll_attempts",
                "must poll at least once",
            ),
            (
                self.upload.batch_workers == 0,
                "upload.batch_workers",
                "must run at least one upload worker",
            ),
        ];

        for (invalid, key, message) in checks {
            if invalid {
                return Err(Error::Config {
                    message: format!("{key} {message}"),
                    key: Some(key.to_string()),
                });
            }
        }
        Ok(())
    }
}

/// Retry behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of calls before giving up, first call included (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait applied when a rate-limited response carries no suggestion (default: 1 second)
    #[serde(default = "default_rate_limit_wait", with = "duration_serde")]
    pub default_rate_limit_wait: Duration,

    /// Upper bound on any server-suggested wait (default: 60 seconds)
    #[serde(default = "default_max_rate_limit_wait", with = "duration_serde")]
    pub max_rate_limit_wait: Duration,

    /// Per-request timeout for HTTP-backed collaborators (default: 15 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            default_rate_limit_wait: default_rate_limit_wait(),
            max_rate_limit_wait: default_max_rate_limit_wait(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Cursor pagination configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Consecutive empty pages with `has_more = true` tolerated before the
    /// collection is treated as exhausted (default: 3)
    #[serde(default = "default_max_empty_pages")]
    pub max_empty_pages: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_empty_pages: default_max_empty_pages(),
        }
    }
}

/// Proxy screening configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Candidates health-checked per selection, taken after shuffling (default: 20)
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Maximum simultaneous health checks (default: 10)
    #[serde(default = "default_proxy_concurrency")]
    pub concurrency: usize,

    /// Timeout for one health check round trip (default: 5 seconds)
    #[serde(default = "default_check_timeout", with = "duration_serde")]
    pub check_timeout: Duration,

    /// URL fetched through each candidate (default: "https://httpbin.org/ip")
    #[serde(default = "default_check_url")]
    pub check_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            concurrency: default_proxy_concurrency(),
            check_timeout: default_check_timeout(),
            check_url: default_check_url(),
        }
    }
}

/// File import polling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Status polls before the job is reported as timed out (default: 30)
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Wait between polls while the job is pending (default: 2 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Concurrent uploads in a batch (default: 3)
    ///
    /// Chosen to respect the destination service's own rate limit. Independent of
    /// [`ProxyConfig::concurrency`].
    #[serde(default = "default_batch_workers")]
    pub batch_workers: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: default_max_poll_attempts(),
            poll_interval: default_poll_interval(),
            batch_workers: default_batch_workers(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_rate_limit_wait() -> Duration {
    Duration::from_secs(1)
}

fn default_max_rate_limit_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_max_empty_pages() -> u32 {
    3
}

fn default_sample_size() -> usize {
    20
}

fn default_proxy_concurrency() -> usize {
    10
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_check_url() -> String {
    "https://httpbin.org/ip".to_string()
}

fn default_max_poll_attempts() -> u32 {
    30
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_batch_workers() -> usize {
    3
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
