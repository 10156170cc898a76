//! Data source module for repository statistics
//!
//! This module contains everything that talks to the remote API:
//! - The `DataSource` trait the crawl core depends on
//! - A lazy, restartable stream over an organization's repository pages
//! - The GitHub GraphQL client with its own network-level retry and
//!   rate-limit pacing

mod github;
mod query;
mod traits;
mod types;

pub use github::{build_http_client, GithubClient};
pub use traits::{collect_collection, collection_items, DataSource, PagedItem, SourceError};
pub use types::{PageInfo, RepositoryPage, RepositoryRecord};
