//! Page-number pagination expressed as cursor pagination
//!
//! Search endpoints number their pages from 1 instead of handing out cursors, and
//! signal the end by omitting the item list. [`PageNumberAdapter`] encodes the page
//! number in the cursor so the same collector drives both styles.

use super::ListEndpoint;
use crate::error::{Error, Result};
use crate::types::{Cursor, Page};
use async_trait::async_trait;

/// One response from a page-numbered endpoint
#[derive(Clone, Debug, PartialEq)]
pub struct NumberedPage<T> {
    /// Items on this page; `None` when the endpoint omitted the list entirely
    pub items: Option<Vec<T>>,
    /// Whether the server claims more pages exist
    pub has_more: bool,
}

/// A list endpoint addressed by page number (collaborator)
#[async_trait]
pub trait NumberedEndpoint: Send + Sync {
    /// Item type produced by this endpoint
    type Item: Send;

    /// Fetch page `page`, counting from 1
    async fn fetch_page(&self, page: u32) -> Result<NumberedPage<Self::Item>>;
}

/// Adapts a [`NumberedEndpoint`] to [`ListEndpoint`]
#[derive(Clone, Debug)]
pub struct PageNumberAdapter<E> {
    inner: E,
}

impl<E> PageNumberAdapter<E> {
    /// Wrap a page-numbered endpoint
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    /// Unwrap the inner endpoint
    pub fn into_inner(self) -> E {
        self.inner
    }
}

fn page_number(cursor: &Cursor) -> Result<u32> {
    if cursor.is_start() {
        return Ok(1);
    }
    cursor
        .as_str()
        .parse::<u32>()
        .map_err(|_| Error::malformed(format!("invalid page cursor '{cursor}'")))
}

#[async_trait]
impl<E: NumberedEndpoint> ListEndpoint for PageNumberAdapter<E> {
    type Item = E::Item;

    async fn fetch(&self, cursor: &Cursor) -> Result<Page<Self::Item>> {
        let page = page_number(cursor)?;
        let numbered = self.inner.fetch_page(page).await?;

        let Some(items) = numbered.items else {
            return Ok(Page::last(Vec::new()));
        };
        // The page counter cannot go past u32::MAX
        let Some(next) = page.checked_add(1) else {
            tracing::warn!(page, "Page number limit reached, treating as end of list");
            return Ok(Page::last(items));
        };
        Ok(Page {
            items,
            next_cursor: Some(Cursor(next.to_string())),
            has_more: numbered.has_more,
        })
    }
}
