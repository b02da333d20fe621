//! Two-level collections
//!
//! Some lists carry, per entry, a secondary paginated list (e.g. a comment and its
//! replies). The parent list is walked first; then each parent that needs it gets its
//! own exhaustive child walk starting at the cursor the parent carries.
//!
//! A failed child walk does not abort the collection: the parent is still returned,
//! marked incomplete, with the failure attached.

use super::{ListEndpoint, PaginatedCollector, Termination};
use crate::error::{Error, Result};
use crate::types::{CollectionResult, Cursor};

/// Where a parent's child walk starts
#[derive(Clone, Debug)]
pub struct NestedSeed<S> {
    /// Endpoint scoped to one parent
    pub endpoint: S,
    /// First child cursor, as carried by the parent
    pub start: Cursor,
}

/// A parent item together with its collected children
#[derive(Debug)]
pub struct Nested<P, C> {
    /// The parent item, unchanged
    pub parent: P,
    /// Children in discovery order (empty when the walk failed or was not needed)
    pub children: Vec<C>,
    /// False when the child walk failed
    pub complete: bool,
    /// Why the child walk failed
    pub error: Option<Error>,
}

impl PaginatedCollector {
    /// Collect a parent list, then enrich each parent with its child list
    ///
    /// `seed` decides per parent whether a child walk is needed. Returning `None`
    /// (e.g. the parent says it has no further children) keeps the parent complete
    /// with no extra children.
    ///
    /// A failure while walking the parent list aborts the whole call. A failure while
    /// walking one parent's children only marks that parent incomplete. Cancellation
    /// always aborts.
    pub async fn collect_nested<E, S, F>(
        &self,
        endpoint: &E,
        termination: Termination,
        mut seed: F,
    ) -> Result<CollectionResult<Nested<E::Item, S::Item>>>
    where
        E: ListEndpoint + ?Sized,
        S: ListEndpoint,
        F: FnMut(&E::Item) -> Option<NestedSeed<S>>,
    {
        let parents = self.collect(endpoint, termination).await?;
        let mut enriched = Vec::with_capacity(parents.items.len());
        let mut failed = 0usize;

        for (index, parent) in parents.items.into_iter().enumerate() {
            let Some(NestedSeed {
                endpoint: child_endpoint,
                start,
            }) = seed(&parent)
            else {
                enriched.push(Nested {
                    parent,
                    children: Vec::new(),
                    complete: true,
                    error: None,
                });
                continue;
            };

            match self
                .collect_from(&child_endpoint, start, Termination::Exhaustive)
                .await
            {
                Ok(children) => enriched.push(Nested {
                    parent,
                    children: children.items,
                    complete: true,
                    error: None,
                }),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        parent_index = index,
                        error = %e,
                        "Nested collection failed, keeping parent as incomplete"
                    );
                    enriched.push(Nested {
                        parent,
                        children: Vec::new(),
                        complete: false,
                        error: Some(e),
                    });
                }
            }
        }

        if failed > 0 {
            tracing::info!(
                parents = enriched.len(),
                incomplete = failed,
                "Nested collection finished with incomplete parents"
            );
        }

        Ok(CollectionResult {
            items: enriched,
            truncated: parents.truncated,
        })
    }
}
