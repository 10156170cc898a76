//! GraphQL documents and response shapes

use crate::source::types::{PageInfo, RepositoryRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;

const REPOSITORY_FIELDS: &str = r#"
fragment RepositoryFields on Repository {
  name
  nameWithOwner
  owner { login }
  description
  isArchived
  isFork
  createdAt
  pushedAt
  diskUsage
  primaryLanguage { name }
  stargazerCount
  forkCount
  watchers { totalCount }
  openIssues: issues(states: OPEN) { totalCount }
  closedIssues: issues(states: CLOSED) { totalCount }
  openPullRequests: pullRequests(states: OPEN) { totalCount }
  mergedPullRequests: pullRequests(states: MERGED) { totalCount }
  releases { totalCount }
  defaultBranchRef {
    target {
      ... on Commit { history { totalCount } }
    }
  }
}
"#;

const ORGANIZATION_REPOSITORIES: &str = r#"
query OrganizationRepositories($login: String!, $first: Int!, $after: String) {
  rateLimit { remaining resetAt }
  organization(login: $login) {
    repositories(first: $first, after: $after, orderBy: { field: NAME, direction: ASC }) {
      pageInfo { endCursor hasNextPage }
      nodes { ...RepositoryFields }
    }
  }
}
"#;

const SINGLE_REPOSITORY: &str = r#"
query SingleRepository($owner: String!, $name: String!) {
  rateLimit { remaining resetAt }
  repository(owner: $owner, name: $name) { ...RepositoryFields }
}
"#;

pub(crate) fn organization_repositories() -> String {
    format!("{}{}", ORGANIZATION_REPOSITORIES, REPOSITORY_FIELDS)
}

pub(crate) fn single_repository() -> String {
    format!("{}{}", SINGLE_REPOSITORY, REPOSITORY_FIELDS)
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RateLimit {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrganizationData {
    pub rate_limit: Option<RateLimit>,
    pub organization: Option<OrganizationNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrganizationNode {
    pub repositories: RepositoryConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepositoryConnection {
    pub page_info: PageInfo,
    #[serde(default)]
    pub nodes: Vec<Option<RepositoryNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepositoryData {
    pub rate_limit: Option<RateLimit>,
    pub repository: Option<RepositoryNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Count {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    target: Option<CommitTarget>,
}

#[derive(Debug, Deserialize)]
struct CommitTarget {
    history: Option<Count>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepositoryNode {
    name: String,
    name_with_owner: String,
    owner: Login,
    description: Option<String>,
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    is_fork: bool,
    created_at: Option<DateTime<Utc>>,
    pushed_at: Option<DateTime<Utc>>,
    disk_usage: Option<u64>,
    primary_language: Option<Named>,
    #[serde(default)]
    stargazer_count: u64,
    #[serde(default)]
    fork_count: u64,
    #[serde(default)]
    watchers: Count,
    #[serde(default)]
    open_issues: Count,
    #[serde(default)]
    closed_issues: Count,
    #[serde(default)]
    open_pull_requests: Count,
    #[serde(default)]
    merged_pull_requests: Count,
    #[serde(default)]
    releases: Count,
    default_branch_ref: Option<BranchRef>,
}

impl From<RepositoryNode> for RepositoryRecord {
    fn from(node: RepositoryNode) -> Self {
        let commits = node
            .default_branch_ref
            .and_then(|r| r.target)
            .and_then(|t| t.history)
            .map_or(0, |h| h.total_count);

        Self {
            owner: node.owner.login,
            name: node.name,
            name_with_owner: node.name_with_owner,
            description: node.description.filter(|d| !d.is_empty()),
            primary_language: node.primary_language.map(|l| l.name),
            is_archived: node.is_archived,
            is_fork: node.is_fork,
            created_at: node.created_at,
            pushed_at: node.pushed_at,
            disk_usage_kb: node.disk_usage.unwrap_or(0),
            stars: node.stargazer_count,
            forks: node.fork_count,
            watchers: node.watchers.total_count,
            open_issues: node.open_issues.total_count,
            closed_issues: node.closed_issues.total_count,
            open_pull_requests: node.open_pull_requests.total_count,
            merged_pull_requests: node.merged_pull_requests.total_count,
            releases: node.releases.total_count,
            commits,
        }
    }
}
