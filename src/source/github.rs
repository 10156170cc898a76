//! GitHub GraphQL client
//!
//! This module handles every request sent to the API, including:
//! - Building the HTTP client with the configured user agent
//! - Bearer authentication
//! - A short network-level retry for 429/5xx responses and timeouts,
//!   honoring `Retry-After`
//! - Pausing until the rate-limit window resets when the remaining budget
//!   drops below a floor
//! - Classifying failures into `SourceError`

use crate::config::ApiConfig;
use crate::retry::{Sleeper, TokioSleeper};
use crate::source::query::{
    self, GraphQlError, GraphQlResponse, OrganizationData, RateLimit, RepositoryData,
};
use crate::source::traits::{DataSource, SourceError};
use crate::source::types::{RepositoryPage, RepositoryRecord};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The API configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `DataSource` backed by the GitHub GraphQL API
pub struct GithubClient {
    client: Client,
    endpoint: Url,
    token: String,
    network_retries: u32,
    network_retry_delay: Duration,
    rate_limit_floor: u32,
    max_rate_limit_wait: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl GithubClient {
    /// Creates a client for the configured endpoint
    pub fn new(config: &ApiConfig, token: impl Into<String>) -> Result<Self, SourceError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| SourceError::Malformed(format!("endpoint {}: {}", config.endpoint, e)))?;

        Ok(Self {
            client: build_http_client(config)?,
            endpoint,
            token: token.into(),
            network_retries: config.network_retries,
            network_retry_delay: Duration::from_millis(config.network_retry_delay_ms),
            rate_limit_floor: config.rate_limit_floor,
            max_rate_limit_wait: Duration::from_secs(config.max_rate_limit_wait_secs),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replaces the sleeper used for backoff and rate-limit pauses
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Posts a query and decodes its `data` member
    async fn graphql<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: serde_json::Value,
    ) -> Result<T, SourceError> {
        let body = json!({ "query": document, "variables": variables });
        let mut attempt = 0;

        loop {
            attempt += 1;
            let can_retry = attempt <= self.network_retries;

            let response = match self
                .client
                .post(self.endpoint.clone())
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if can_retry && (e.is_timeout() || e.is_connect()) => {
                    tracing::warn!(attempt, "Request failed, retrying: {}", e);
                    self.sleeper.sleep(self.network_retry_delay).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(SourceError::Unauthorized);
            }

            if is_throttled(&response) || status.is_server_error() {
                let wait = retry_after(&response)
                    .unwrap_or(self.network_retry_delay)
                    .min(self.max_rate_limit_wait);
                let text = response.text().await.unwrap_or_default();
                if can_retry {
                    tracing::warn!(
                        attempt,
                        status = status.as_u16(),
                        wait_ms = wait.as_millis() as u64,
                        "API responded with a transient error, retrying"
                    );
                    self.sleeper.sleep(wait).await;
                    continue;
                }
                return Err(if status.is_server_error() {
                    SourceError::Status {
                        status: status.as_u16(),
                        body: text,
                    }
                } else {
                    SourceError::RateLimited(text)
                });
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(SourceError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let parsed: GraphQlResponse<T> = response.json().await?;
            if !parsed.errors.is_empty() {
                let error = classify_errors(&parsed.errors);
                if can_retry && matches!(error, SourceError::RateLimited(_)) {
                    tracing::warn!(attempt, "GraphQL rate limit hit, retrying: {}", error);
                    self.sleeper.sleep(self.network_retry_delay).await;
                    continue;
                }
                return Err(error);
            }

            return parsed
                .data
                .ok_or_else(|| SourceError::Malformed("response carried no data".to_string()));
        }
    }

    /// Pauses until the window resets when few requests remain
    async fn respect_rate_limit(&self, rate_limit: Option<&RateLimit>) {
        let Some(rate_limit) = rate_limit else {
            return;
        };
        if rate_limit.remaining >= self.rate_limit_floor {
            return;
        }

        let until_reset = (rate_limit.reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let wait = until_reset.min(self.max_rate_limit_wait);
        tracing::warn!(
            remaining = rate_limit.remaining,
            reset_at = %rate_limit.reset_at,
            wait_secs = wait.as_secs(),
            "Rate limit nearly exhausted, pausing"
        );
        self.sleeper.sleep(wait).await;
    }
}

#[async_trait]
impl DataSource for GithubClient {
    async fn fetch_collection_page(
        &self,
        collection: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RepositoryPage, SourceError> {
        let data: OrganizationData = self
            .graphql(
                &query::organization_repositories(),
                json!({ "login": collection, "first": page_size, "after": cursor }),
            )
            .await?;
        self.respect_rate_limit(data.rate_limit.as_ref()).await;

        let organization = data
            .organization
            .ok_or_else(|| SourceError::NotFound(format!("organization {}", collection)))?;
        let connection = organization.repositories;

        Ok(RepositoryPage {
            items: connection
                .nodes
                .into_iter()
                .flatten()
                .map(RepositoryRecord::from)
                .collect(),
            page_info: connection.page_info,
        })
    }

    async fn fetch_single_entity(&self, owner: &str, name: &str) -> Result<RepositoryRecord, SourceError> {
        let data: RepositoryData = self
            .graphql(
                &query::single_repository(),
                json!({ "owner": owner, "name": name }),
            )
            .await?;
        self.respect_rate_limit(data.rate_limit.as_ref()).await;

        data.repository
            .map(RepositoryRecord::from)
            .ok_or_else(|| SourceError::NotFound(format!("repository {}/{}", owner, name)))
    }
}

/// 429, or a 403 carrying `Retry-After` (secondary rate limit)
fn is_throttled(response: &Response) -> bool {
    let status = response.status();
    status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && response.headers().contains_key(RETRY_AFTER))
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn classify_errors(errors: &[GraphQlError]) -> SourceError {
    let message = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    let has_kind = |kind: &str| errors.iter().any(|e| e.kind.as_deref() == Some(kind));
    if has_kind("NOT_FOUND") {
        SourceError::NotFound(message)
    } else if has_kind("RATE_LIMITED") {
        SourceError::RateLimited(message)
    } else {
        SourceError::GraphQl(message)
    }
}
