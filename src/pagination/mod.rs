//! Cursor pagination over remote list endpoints
//!
//! [`PaginatedCollector`] walks a [`ListEndpoint`] from the start cursor until the
//! endpoint reports no further data, or until a caller-supplied bound is reached.
//!
//! ## Termination
//!
//! - `has_more = false` ends the walk.
//! - A page without a next cursor ends the walk even if `has_more = true`. This is an
//!   endpoint anomaly, not an error.
//! - More than `max_empty_pages` consecutive empty pages with `has_more = true` end the
//!   walk without error.
//! - [`Termination::Bounded`] additionally stops once enough items are accumulated and
//!   truncates to exactly the bound.
//!
//! ## Failures
//!
//! Every fetch goes through the [`RetryExecutor`]. The first unrecoverable failure
//! aborts the whole collection; partial progress is discarded so a short list is never
//! mistaken for a complete one.
//!
//! ## Usage
//!
//! ```no_run
//! use notesync::config::{PaginationConfig, RetryConfig};
//! use notesync::pagination::{ListEndpoint, PaginatedCollector, Termination};
//! use notesync::retry::RetryExecutor;
//!
//! # async fn example<E: ListEndpoint>(endpoint: E) -> notesync::Result<()> {
//! let collector = PaginatedCollector::new(
//!     RetryExecutor::new(RetryConfig::default()),
//!     PaginationConfig::default(),
//! );
//! let notes = collector.collect(&endpoint, Termination::Bounded(50)).await?;
//! println!("collected {} (truncated: {})", notes.len(), notes.truncated);
//! # Ok(())
//! # }
//! ```

mod nested;
mod page_number;

pub use nested::{Nested, NestedSeed};
pub use page_number::{NumberedEndpoint, NumberedPage, PageNumberAdapter};

use crate::config::PaginationConfig;
use crate::error::Result;
use crate::retry::RetryExecutor;
use crate::types::{CollectionResult, Cursor, Page};
use async_trait::async_trait;
use std::sync::Arc;

/// A remote list endpoint (collaborator)
///
/// Must be idempotent for a given cursor. Rate limiting, transient and permanent
/// failures are reported through the matching [`crate::Error`] variants.
#[async_trait]
pub trait ListEndpoint: Send + Sync {
    /// Item type produced by this endpoint
    type Item: Send;

    /// Fetch the page that starts at `cursor`
    async fn fetch(&self, cursor: &Cursor) -> Result<Page<Self::Item>>;
}

#[async_trait]
impl<E: ListEndpoint + ?Sized> ListEndpoint for Arc<E> {
    type Item = E::Item;

    async fn fetch(&self, cursor: &Cursor) -> Result<Page<Self::Item>> {
        (**self).fetch(cursor).await
    }
}

/// When a collection stops
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Until the endpoint runs out of data
    Exhaustive,
    /// Until the endpoint runs out of data or this many items are collected
    Bounded(usize),
}

/// Walks list endpoints to completion or to a bound
#[derive(Clone, Debug)]
pub struct PaginatedCollector {
    executor: RetryExecutor,
    config: PaginationConfig,
}

impl PaginatedCollector {
    /// Create a collector that fetches through `executor`
    pub fn new(executor: RetryExecutor, config: PaginationConfig) -> Self {
        Self { executor, config }
    }

    /// Collect from the start cursor
    pub async fn collect<E>(
        &self,
        endpoint: &E,
        termination: Termination,
    ) -> Result<CollectionResult<E::Item>>
    where
        E: ListEndpoint + ?Sized,
    {
        self.collect_from(endpoint, Cursor::start(), termination)
            .await
    }

    /// Collect starting at an arbitrary cursor
    ///
    /// Used for nested walks, where the parent item carries the first child cursor.
    pub async fn collect_from<E>(
        &self,
        endpoint: &E,
        start: Cursor,
        termination: Termination,
    ) -> Result<CollectionResult<E::Item>>
    where
        E: ListEndpoint + ?Sized,
    {
        if termination == Termination::Bounded(0) {
            return Ok(CollectionResult {
                items: Vec::new(),
                truncated: false,
            });
        }

        let mut cursor = start;
        let mut items = Vec::new();
        let mut pages: u32 = 0;
        let mut empty_streak: u32 = 0;

        loop {
            let page = self.executor.execute(|| endpoint.fetch(&cursor)).await?;
            pages += 1;

            let continues = page.continues();
            let Page {
                items: page_items,
                next_cursor,
                has_more,
            } = page;
            let page_len = page_items.len();
            items.extend(page_items);

            tracing::debug!(
                page = pages,
                cursor = %cursor,
                page_items = page_len,
                total = items.len(),
                has_more,
                "Fetched page"
            );

            let next_cursor = next_cursor.filter(|_| continues);

            if let Termination::Bounded(limit) = termination {
                if items.len() >= limit {
                    let truncated = items.len() > limit || next_cursor.is_some();
                    items.truncate(limit);
                    tracing::info!(pages, total = items.len(), truncated, "Collection reached bound");
                    return Ok(CollectionResult { items, truncated });
                }
            }

            let Some(next_cursor) = next_cursor else {
                if has_more {
                    tracing::warn!(
                        page = pages,
                        "Endpoint reported more data without a cursor, treating as end of list"
                    );
                }
                tracing::info!(pages, total = items.len(), "Collection complete");
                return Ok(CollectionResult {
                    items,
                    truncated: false,
                });
            };

            if page_len == 0 {
                empty_streak += 1;
                if empty_streak > self.config.max_empty_pages {
                    tracing::warn!(
                        empty_pages = empty_streak,
                        "Too many consecutive empty pages, treating as end of list"
                    );
                    return Ok(CollectionResult {
                        items,
                        truncated: false,
                    });
                }
            } else {
                empty_streak = 0;
            }

            cursor = next_cursor;
        }
    }
}
