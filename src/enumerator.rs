//! Paginated search result enumeration
//!
//! Produces a lazy stream of search hits from the remote search endpoint.
//! Enumeration is restartable only from page 1; there is no mid-stream resume
//! point. Resumability is handled per file by the ledger, not at the
//! pagination level. A payload the API layer cannot parse is fatal for the
//! whole run, since guessing at a broken contract could silently miss
//! results.

use crate::api::CodeHostApi;
use crate::config::RetryConfig;
use crate::error::Result;
use crate::retry;
use crate::types::SearchHit;
use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;

/// Lazily enumerates blob search results, page by page
pub struct ResultEnumerator {
    api: Arc<dyn CodeHostApi>,
    query: String,
    group: Option<String>,
    page_size: u32,
    retry: RetryConfig,
}

impl ResultEnumerator {
    /// Create an enumerator for a query, optionally scoped to a group
    pub fn new(
        api: Arc<dyn CodeHostApi>,
        query: impl Into<String>,
        group: Option<String>,
        page_size: u32,
        retry: RetryConfig,
    ) -> Self {
        Self {
            api,
            query: query.into(),
            group,
            page_size,
            retry,
        }
    }

    /// Stream search results one page at a time
    ///
    /// Each page fetch goes through the retry policy. The stream ends after
    /// the first page with fewer than `page_size` hits; an empty page ends it
    /// immediately without yielding.
    pub fn pages(self) -> impl Stream<Item = Result<Vec<SearchHit>>> {
        stream::try_unfold((self, 1u32, false), |(this, page, done)| async move {
            if done {
                return Ok(None);
            }

            let (result, _attempts) = retry::execute(&this.retry, || {
                this.api
                    .search_page(&this.query, this.group.as_deref(), page, this.page_size)
            })
            .await;
            let hits = result?;

            if hits.is_empty() {
                return Ok(None);
            }

            tracing::debug!(page, count = hits.len(), "enumerated search results page");
            let last_page = (hits.len() as u32) < this.page_size;
            Ok(Some((hits, (this, page + 1, last_page))))
        })
    }

    /// Stream individual search hits, flattening page boundaries
    pub fn hits(self) -> impl Stream<Item = Result<SearchHit>> {
        self.pages()
            .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
            .try_flatten()
    }
}
