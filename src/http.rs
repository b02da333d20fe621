//! HTTP helpers shared by the HTTP-backed collaborators
//!
//! Maps transport outcomes onto the retry taxonomy:
//!
//! | Outcome                         | Error                      |
//! |---------------------------------|----------------------------|
//! | 429                             | `RateLimited` (Retry-After) |
//! | 408, 5xx                        | `TransientNetwork`         |
//! | other 4xx                       | `PermanentRequest`         |
//! | timeout / connect failure       | `TransientNetwork`         |
//! | undecodable body                | `PermanentRequest`         |

use crate::error::{Error, Result};
use crate::proxy::ProxyHandle;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Longest error body echoed into an error message
const MAX_ERROR_BODY_CHARS: usize = 200;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Error::Config {
                message: format!("invalid request: {e}"),
                key: None,
            }
        } else if e.is_decode() {
            Error::malformed(format!("undecodable response: {e}"))
        } else if e.is_timeout() {
            Error::TransientNetwork(format!("request timed out: {e}"))
        } else if e.is_connect() {
            Error::TransientNetwork(format!("connection failed: {e}"))
        } else {
            Error::TransientNetwork(e.to_string())
        }
    }
}

/// Pass successful responses through and turn the rest into typed errors
pub async fn classify_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after(response.headers());
        return Err(Error::RateLimited { retry_after });
    }

    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return Err(Error::TransientNetwork(format!("server returned {status}")));
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::PermanentRequest {
        status: Some(status.as_u16()),
        message: error_message(status, &body),
    })
}

/// Parse a `Retry-After` header given in whole seconds
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Prefer the JSON `message`/`msg` field of an error body over the raw text
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("msg"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    match from_json {
        Some(message) => format!("{message} (status {})", status.as_u16()),
        None if body.trim().is_empty() => format!("server returned {status}"),
        None => {
            let snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            format!("server returned {status}: {snippet}")
        }
    }
}

/// Build a client with a per-request timeout, routed through `proxy` when given
///
/// Callers that got no healthy proxy pass `None` and connect directly.
pub fn build_client(timeout: Duration, proxy: Option<&ProxyHandle>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(handle) = proxy {
        builder = builder.proxy(handle.to_reqwest_proxy()?);
    }
    builder.build().map_err(|e| Error::Config {
        message: format!("failed to create HTTP client: {e}"),
        key: None,
    })
}
