//! Proxy screening
//!
//! [`ProxyPool`] takes a caller-supplied list of untrusted proxy addresses, health-checks
//! a random sample of them with bounded concurrency, and hands back one working proxy
//! chosen uniformly at random, or `None`.
//!
//! `None` is a normal outcome, not an error: the caller decides whether to connect
//! directly or give up. Individual check failures are never surfaced; an unhealthy
//! candidate is simply absent from the working set. Health results are not kept
//! between calls.
//!
//! ## Usage
//!
//! ```no_run
//! use notesync::config::ProxyConfig;
//! use notesync::proxy::{ProxyPool, parse_candidate_lines};
//!
//! # async fn example() -> notesync::Result<()> {
//! let pool = ProxyPool::with_http_checker(ProxyConfig::default());
//! let candidates = parse_candidate_lines("1.2.3.4:8080\n5.6.7.8:3128\n");
//! match pool.select_working(&candidates).await {
//!     Some(proxy) => println!("using {}", proxy.address()),
//!     None => println!("no healthy proxy, connecting directly"),
//! }
//! # Ok(())
//! # }
//! ```

mod checker;
mod source;

pub use checker::{HealthChecker, HttpHealthChecker};
pub use source::{load_candidates, parse_candidate_lines, parse_candidates};

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::types::{ProxyCandidate, ProxyHealth};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A proxy that passed its health check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyHandle {
    address: String,
}

impl ProxyHandle {
    /// Wrap a `host:port` address
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// The `host:port` address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Proxy URL used for both http and https traffic
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// A reqwest proxy routing all schemes through this address
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy> {
        reqwest::Proxy::all(self.url()).map_err(|e| Error::Config {
            message: format!("invalid proxy address '{}': {e}", self.address),
            key: None,
        })
    }
}

/// Screens proxy candidates and selects a working one
#[derive(Clone)]
pub struct ProxyPool {
    config: ProxyConfig,
    checker: Arc<dyn HealthChecker>,
    cancel: CancellationToken,
}

impl ProxyPool {
    /// Create a pool with a custom checker
    pub fn new(config: ProxyConfig, checker: Arc<dyn HealthChecker>) -> Self {
        Self {
            config,
            checker,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a pool that checks `config.check_url` through each candidate
    pub fn with_http_checker(config: ProxyConfig) -> Self {
        let checker = Arc::new(HttpHealthChecker::new(
            config.check_url.clone(),
            config.check_timeout,
        ));
        Self::new(config, checker)
    }

    /// Attach a cancellation token; a cancelled selection returns `None`
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Select a working proxy using the configured sample size and concurrency
    pub async fn select_working(&self, candidates: &[ProxyCandidate]) -> Option<ProxyHandle> {
        self.select_working_with(candidates, self.config.sample_size, self.config.concurrency)
            .await
    }

    /// Select a working proxy from a random sample of `sample_size` candidates,
    /// checking at most `concurrency` at a time
    pub async fn select_working_with(
        &self,
        candidates: &[ProxyCandidate],
        sample_size: usize,
        concurrency: usize,
    ) -> Option<ProxyHandle> {
        let results = self.screen(candidates, sample_size, concurrency).await;
        if self.cancel.is_cancelled() {
            tracing::debug!("Proxy selection cancelled");
            return None;
        }

        let healthy: Vec<&ProxyCandidate> = results
            .iter()
            .filter(|h| h.reachable)
            .map(|h| &h.candidate)
            .collect();

        tracing::info!(
            checked = results.len(),
            healthy = healthy.len(),
            "Proxy screening finished"
        );

        let chosen = healthy.choose(&mut rand::thread_rng())?;
        Some(ProxyHandle::new(chosen.address.clone()))
    }

    /// Health-check a shuffled sample and report every result
    ///
    /// Results arrive in completion order, not submission order.
    pub async fn screen(
        &self,
        candidates: &[ProxyCandidate],
        sample_size: usize,
        concurrency: usize,
    ) -> Vec<ProxyHealth> {
        let mut sample = candidates.to_vec();
        sample.shuffle(&mut rand::thread_rng());
        sample.truncate(sample_size);

        let timeout = self.config.check_timeout;

        stream::iter(sample)
            .map(|candidate| {
                let checker = Arc::clone(&self.checker);
                let cancel = self.cancel.clone();

                async move {
                    let reachable = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        outcome = tokio::time::timeout(timeout, checker.check(&candidate)) => {
                            match outcome {
                                Ok(Ok(())) => true,
                                Ok(Err(e)) => {
                                    tracing::debug!(address = %candidate.address, error = %e, "Proxy check failed");
                                    false
                                }
                                Err(_) => {
                                    tracing::debug!(address = %candidate.address, "Proxy check timed out");
                                    false
                                }
                            }
                        }
                    };

                    ProxyHealth {
                        candidate,
                        reachable,
                        checked_at: Utc::now(),
                    }
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}
