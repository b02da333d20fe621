//! Proxy health checks

use super::ProxyHandle;
use crate::error::Result;
use crate::http::{build_client, classify_response};
use crate::types::ProxyCandidate;
use async_trait::async_trait;
use std::time::Duration;

/// Decides whether one proxy candidate is usable
///
/// The pool applies its own timeout around every call, so implementations do not
/// need to bound their latency. Any error means "unhealthy".
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Perform one round trip through `candidate`
    async fn check(&self, candidate: &ProxyCandidate) -> Result<()>;
}

/// Fetches a check URL through the candidate and expects a 2xx response
#[derive(Clone, Debug)]
pub struct HttpHealthChecker {
    check_url: String,
    timeout: Duration,
}

impl HttpHealthChecker {
    /// Create a checker for `check_url` with a per-request timeout
    pub fn new(check_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            check_url: check_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl HealthChecker for HttpHealthChecker {
    async fn check(&self, candidate: &ProxyCandidate) -> Result<()> {
        let handle = ProxyHandle::new(candidate.address.clone());
        let client = build_client(self.timeout, Some(&handle))?;
        let response = client.get(&self.check_url).send().await?;
        classify_response(response).await?;
        tracing::debug!(address = %candidate.address, "Proxy is healthy");
        Ok(())
    }
}
