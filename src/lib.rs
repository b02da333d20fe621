//! # notesync
//!
//! Resilient data-acquisition plumbing for harvesting content from a cookie-authenticated
//! web platform and archiving it into a note service.
//!
//! ## Building blocks
//!
//! - [`PaginatedCollector`] walks cursor-paginated list endpoints, exhaustively or up
//!   to a bound, with nested (parent to child) walks and a page-number adapter.
//! - [`ProxyPool`] health-checks a random sample of untrusted proxies with bounded
//!   concurrency and picks one working proxy, or none.
//! - [`AsyncJobPoller`] starts server-side import jobs and polls them to a terminal
//!   state, alone or as a bounded-concurrency batch.
//! - [`notion::NotionPageEndpoint`] turns a parsed [`note::Note`] into a database page
//!   whose image blocks reference the uploads of a batch.
//! - [`RetryExecutor`] sits under all of them: rate limits wait for the suggested delay,
//!   transient failures retry immediately, permanent failures surface at once.
//!
//! Every collaborator (list endpoints, health checks, job endpoints) sits behind an async
//! trait, with HTTP-backed implementations in [`platform`], [`proxy`] and [`notion`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use notesync::{AsyncJobPoller, Config, RetryExecutor};
//! use notesync::notion::{NotionUploadEndpoint, image_blocks};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let endpoint = NotionUploadEndpoint::new("secret_token", config.retry.request_timeout)?;
//!     let poller = AsyncJobPoller::new(
//!         Arc::new(endpoint),
//!         RetryExecutor::new(config.retry.clone()),
//!         config.upload.clone(),
//!     );
//!
//!     let sources = vec!["http://img.example.com/a.png".to_string()];
//!     let report = poller.run_batch(&sources).await;
//!     let blocks = image_blocks(report.handles());
//!     println!("{} image blocks ready", blocks.len());
//!     Ok(())
//! }
//! ```
//!
//! The library emits `tracing` events but never installs a subscriber.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// HTTP response classification and client construction
pub mod http;
/// Notes as served by the platform
pub mod note;
/// Notion file-import and page endpoints
pub mod notion;
/// Cursor-driven pagination
pub mod pagination;
/// Platform list endpoints
pub mod platform;
/// Proxy screening and selection
pub mod proxy;
/// Rate-limit aware retry
pub mod retry;
/// Core types
pub mod types;
/// Asynchronous import jobs
pub mod upload;

// Re-export commonly used types
pub use config::{Config, PaginationConfig, ProxyConfig, RetryConfig, UploadConfig};
pub use error::{Error, FailureClass, Result};
pub use pagination::{ListEndpoint, PaginatedCollector, Termination};
pub use proxy::{HealthChecker, ProxyHandle, ProxyPool};
pub use retry::RetryExecutor;
pub use types::{
    CollectionResult, Cursor, JobId, JobState, JobStatus, Page, PermanentHandle, ProxyCandidate,
    ProxyHealth, UploadJob,
};
pub use upload::{AsyncJobPoller, BatchReport, JobEndpoint, UploadOutcome};

pub use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal.
///
/// Every component holding a clone of the token stops its in-flight work: retry waits
/// and poll sleeps end early, proxy screening returns `None`.
///
/// On Unix this listens for SIGTERM and Ctrl+C, elsewhere for Ctrl+C only. If no handler
/// can be registered the token is never cancelled by a signal.
///
/// # Example
///
/// ```no_run
/// use notesync::{CancellationToken, Config, RetryExecutor, cancel_on_signal};
///
/// #[tokio::main]
/// async fn main() {
///     let token = CancellationToken::new();
///     tokio::spawn(cancel_on_signal(token.clone()));
///
///     let executor = RetryExecutor::new(Config::default().retry).with_cancellation(token);
///     // hand the executor to collectors and pollers
/// #   let _ = executor;
/// }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    cancel_when(token, shutdown_signal()).await;
}

/// Cancel `token` once `trigger` completes
///
/// Returns without waiting for `trigger` if the token is cancelled some other way first.
pub async fn cancel_when(token: CancellationToken, trigger: impl Future<Output = ()>) {
    tokio::select! {
        _ = token.cancelled() => {}
        _ = trigger => {
            tracing::info!("Cancelling in-flight work");
            token.cancel();
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = ctrl_c() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for Ctrl+C only");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}

/// Resolves on Ctrl+C, never if the handler cannot be installed
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => {
            tracing::error!(error = %e, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
