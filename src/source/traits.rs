//! The data source seam and its paging stream

use crate::retry::Retryable;
use crate::source::types::{PageInfo, RepositoryPage, RepositoryRecord};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::VecDeque;
use thiserror::Error;

/// Errors raised by a data source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API rejected the credentials")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by the API: {0}")]
    RateLimited(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    /// False for errors that would fail identically on every attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unauthorized | Self::NotFound(_))
    }
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        SourceError::is_retryable(self)
    }
}

/// Paginated access to repository statistics
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetches one page of an organization's repositories
    ///
    /// `cursor` is the end cursor of the previous page, `None` for the first.
    async fn fetch_collection_page(
        &self,
        collection: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RepositoryPage, SourceError>;

    /// Fetches a single repository
    async fn fetch_single_entity(&self, owner: &str, name: &str) -> Result<RepositoryRecord, SourceError>;
}

/// One record yielded by `collection_items`
#[derive(Debug, Clone, PartialEq)]
pub struct PagedItem {
    pub record: RepositoryRecord,
    /// Pagination state of the page the record came from
    pub page_info: PageInfo,
    /// True for the final record of its page
    pub last_in_page: bool,
}

struct Pager {
    cursor: Option<String>,
    buffered: VecDeque<PagedItem>,
    exhausted: bool,
}

/// Lazily walks an organization's repositories starting after `cursor`
///
/// Pages are fetched only as the stream is polled. The first error ends
/// the stream.
pub fn collection_items<'a>(
    source: &'a dyn DataSource,
    collection: &'a str,
    page_size: u32,
    cursor: Option<String>,
) -> BoxStream<'a, Result<PagedItem, SourceError>> {
    let pager = Pager {
        cursor,
        buffered: VecDeque::new(),
        exhausted: false,
    };

    stream::try_unfold(pager, move |mut pager| async move {
        loop {
            if let Some(item) = pager.buffered.pop_front() {
                return Ok(Some((item, pager)));
            }
            if pager.exhausted {
                return Ok(None);
            }

            let page = source
                .fetch_collection_page(collection, page_size, pager.cursor.as_deref())
                .await?;
            tracing::debug!(
                org = collection,
                items = page.items.len(),
                has_next = page.page_info.has_next_page,
                "Fetched page"
            );

            let count = page.items.len();
            let page_info = page.page_info;
            pager.exhausted = !page_info.has_next_page || page_info.end_cursor.is_none();
            if !pager.exhausted {
                pager.cursor = page_info.end_cursor.clone();
            }
            pager.buffered = page
                .items
                .into_iter()
                .enumerate()
                .map(|(i, record)| PagedItem {
                    record,
                    page_info: page_info.clone(),
                    last_in_page: i + 1 == count,
                })
                .collect();
        }
    })
    .boxed()
}

/// Fetches every repository of an organization
pub async fn collect_collection(
    source: &dyn DataSource,
    collection: &str,
    page_size: u32,
) -> Result<Vec<RepositoryRecord>, SourceError> {
    collection_items(source, collection, page_size, None)
        .map_ok(|item| item.record)
        .try_collect()
        .await
}
