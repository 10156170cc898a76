//! Runs against a mock GraphQL endpoint

use crate::common::{csv_repositories, options, RecordingSleeper};
use org_harvest::config::ApiConfig;
use org_harvest::output::CsvSink;
use org_harvest::state::CollectionStatus;
use org_harvest::{GithubClient, RunOrchestrator};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn node(name: &str, stars: u64) -> serde_json::Value {
    json!({
        "name": name,
        "nameWithOwner": format!("acme/{}", name),
        "owner": { "login": "acme" },
        "description": "Tools, mostly",
        "isArchived": false,
        "isFork": false,
        "createdAt": "2020-01-01T00:00:00Z",
        "pushedAt": null,
        "diskUsage": 64,
        "primaryLanguage": null,
        "stargazerCount": stars,
        "forkCount": 0,
        "watchers": { "totalCount": 1 },
        "openIssues": { "totalCount": 0 },
        "closedIssues": { "totalCount": 0 },
        "openPullRequests": { "totalCount": 0 },
        "mergedPullRequests": { "totalCount": 0 },
        "releases": { "totalCount": 0 },
        "defaultBranchRef": null
    })
}

fn page(nodes: Vec<serde_json::Value>, end_cursor: &str, has_next: bool) -> serde_json::Value {
    json!({
        "data": {
            "rateLimit": { "remaining": 4999, "resetAt": "2099-01-01T00:00:00Z" },
            "organization": {
                "repositories": {
                    "pageInfo": { "endCursor": end_cursor, "hasNextPage": has_next },
                    "nodes": nodes
                }
            }
        }
    })
}

fn client(server: &MockServer, sleeper: Arc<RecordingSleeper>) -> GithubClient {
    let config = ApiConfig {
        endpoint: format!("{}/graphql", server.uri()),
        network_retries: 1,
        network_retry_delay_ms: 10,
        ..ApiConfig::default()
    };
    GithubClient::new(&config, "token").unwrap().with_sleeper(sleeper)
}

#[tokio::test]
async fn test_organization_pages_end_up_in_csv() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer token"))
        .and(body_partial_json(json!({ "variables": { "login": "acme", "after": null } })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![node("anvil", 3), node("rocket", 42)], "c1", true)),
        )
        .expect(1)
        .mount(&server)
        .await;
    // The second page fails once before it is served
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "after": "c1" } })))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "after": "c1" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![node("sled", 0)], "c2", false)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut opts = options(&dir, &["acme"]);
    opts.page_size = 2;
    let mut run = RunOrchestrator::new(
        opts,
        Arc::new(client(&server, sleeper.clone())),
        Arc::new(CsvSink::new()),
    )
    .with_sleeper(sleeper.clone());

    let summary = run.run().await.unwrap();

    assert_eq!(summary.successful(), 1);
    assert_eq!(summary.reports[0].items_processed, 3);
    let output = summary.reports[0].output_path.as_ref().unwrap();
    assert_eq!(
        csv_repositories(output),
        vec!["acme/anvil", "acme/rocket", "acme/sled"]
    );
    let content = std::fs::read_to_string(output).unwrap();
    let rocket: Vec<&str> = content.lines().nth(2).unwrap().split(',').collect();
    assert!(content.contains("acme/rocket,\"Tools, mostly\","));
    // The quoted description spans two of the naive pieces
    assert_eq!(rocket[11], "42");

    // Only the network retry inside the client slept; the run itself never retried
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(10)]);
    assert_eq!(run.counters().retry_count, 0);
}

#[tokio::test]
async fn test_bad_token_fails_without_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut run = RunOrchestrator::new(
        options(&dir, &["acme"]),
        Arc::new(client(&server, sleeper.clone())),
        Arc::new(CsvSink::new()),
    )
    .with_sleeper(sleeper.clone());

    let summary = run.run().await.unwrap();

    assert_eq!(summary.reports[0].status, CollectionStatus::Failed);
    assert!(summary.reports[0].error.as_deref().unwrap().contains("not retryable"));
    assert!(sleeper.calls().is_empty());
}
