use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Cursor pagination state of one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

/// One page of an organization's repositories
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryPage {
    pub items: Vec<RepositoryRecord>,
    pub page_info: PageInfo,
}

/// Statistics for one repository
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryRecord {
    pub owner: String,
    pub name: String,
    pub name_with_owner: String,
    pub description: Option<String>,
    pub primary_language: Option<String>,
    pub is_archived: bool,
    pub is_fork: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub disk_usage_kb: u64,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub open_issues: u64,
    pub closed_issues: u64,
    pub open_pull_requests: u64,
    pub merged_pull_requests: u64,
    pub releases: u64,
    /// Commits on the default branch; zero for empty repositories
    pub commits: u64,
}

impl RepositoryRecord {
    /// Column names, in the order `csv_row` emits values
    pub const HEADER: &'static [&'static str] = &[
        "organization",
        "repository",
        "name_with_owner",
        "description",
        "primary_language",
        "is_archived",
        "is_fork",
        "created_at",
        "pushed_at",
        "disk_usage_kb",
        "stars",
        "forks",
        "watchers",
        "open_issues",
        "closed_issues",
        "open_pull_requests",
        "merged_pull_requests",
        "releases",
        "commits",
    ];

    /// Identifier recorded in checkpoints: `owner/name`, lower-cased
    pub fn item_id(&self) -> String {
        self.name_with_owner.to_lowercase()
    }

    /// Field values in `HEADER` order
    pub fn csv_row(&self) -> Vec<String> {
        let timestamp = |t: &Option<DateTime<Utc>>| t.map(|t| t.to_rfc3339()).unwrap_or_default();

        vec![
            self.owner.clone(),
            self.name.clone(),
            self.name_with_owner.clone(),
            self.description.clone().unwrap_or_default(),
            self.primary_language.clone().unwrap_or_default(),
            self.is_archived.to_string(),
            self.is_fork.to_string(),
            timestamp(&self.created_at),
            timestamp(&self.pushed_at),
            self.disk_usage_kb.to_string(),
            self.stars.to_string(),
            self.forks.to_string(),
            self.watchers.to_string(),
            self.open_issues.to_string(),
            self.closed_issues.to_string(),
            self.open_pull_requests.to_string(),
            self.merged_pull_requests.to_string(),
            self.releases.to_string(),
            self.commits.to_string(),
        ]
    }
}
