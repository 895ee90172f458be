//! Code-search based workflow discovery.
//!
//! Only used when [`DiscoveryStrategy::CodeSearch`](crate::config::DiscoveryStrategy)
//! is selected. The search endpoint has its own, much lower rate limit, so
//! result pages are always separated by a fixed pause.

use crate::error::Result;
use crate::gateway::{ApiRequest, GitHubGateway};
use crate::types::RepositoryRef;

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Query terms locating workflow files that reference the job token.
pub const SEARCH_MARKER: &str =
    "GITHUB_TOKEN in:file path:.github/workflows extension:yml language:yaml";

/// Results fetched per search page.
pub const SEARCH_PAGE_SIZE: usize = 100;

/// Code search never serves results past this many; later pages fail with 422.
pub const SEARCH_RESULT_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    path: String,
    repository: SearchRepository,
}

#[derive(Debug, Deserialize)]
struct SearchRepository {
    name: String,
}

/// A workflow file located by code search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowHit {
    pub repository: RepositoryRef,
    pub path: String,
}

/// Build the search query for an owner, or for one of its repositories.
pub fn search_query(owner: &str, repo: Option<&str>) -> String {
    match repo {
        Some(repo) => format!("{SEARCH_MARKER} repo:{owner}/{repo}"),
        None => format!("{SEARCH_MARKER} user:{owner}"),
    }
}

/// Locate workflow files of `owner` (or `owner/repo`) through code search.
pub async fn search_workflow_files(
    gateway: &GitHubGateway,
    owner: &str,
    repo: Option<&str>,
    page_pause: Duration,
) -> Result<Vec<WorkflowHit>> {
    let query = search_query(owner, repo);
    let last_page = SEARCH_RESULT_LIMIT / SEARCH_PAGE_SIZE;
    let mut hits = Vec::new();
    let mut page = 1usize;

    loop {
        debug!(query = %query, page, "Searching code");
        let request = ApiRequest::get(gateway.rest_url("/search/code")?)
            .with_query("q", query.as_str())
            .with_query("per_page", SEARCH_PAGE_SIZE.to_string())
            .with_query("page", page.to_string());
        let result: SearchPage = gateway.execute(&request).await?.json()?;

        let count = result.items.len();
        hits.extend(result.items.into_iter().map(|item| WorkflowHit {
            repository: RepositoryRef::new(owner, item.repository.name),
            path: item.path,
        }));

        if count < SEARCH_PAGE_SIZE || hits.len() as u64 >= result.total_count {
            break;
        }
        if page >= last_page {
            warn!(
                owner,
                total = result.total_count,
                kept = hits.len(),
                "Code search results truncated at the search window"
            );
            break;
        }
        tokio::time::sleep(page_pause).await;
        page += 1;
    }

    info!(owner, hits = hits.len(), "Code search complete");
    Ok(hits)
}

/// Group hits by repository, keeping first-seen order.
pub fn group_by_repository(hits: Vec<WorkflowHit>) -> Vec<(RepositoryRef, Vec<String>)> {
    let mut groups: Vec<(RepositoryRef, Vec<String>)> = Vec::new();
    for hit in hits {
        match groups.iter_mut().find(|(repo, _)| *repo == hit.repository) {
            Some((_, paths)) => paths.push(hit.path),
            None => groups.push((hit.repository, vec![hit.path])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> GitHubGateway {
        GitHubGateway::new(&CrawlConfig::new("t").with_api_url(server.uri())).unwrap()
    }

    fn item(repo: &str, file: &str) -> serde_json::Value {
        json!({"name": file, "path": format!(".github/workflows/{file}"), "repository": {"name": repo}})
    }

    #[test]
    fn test_search_query_qualifiers() {
        assert_eq!(
            search_query("octo", None),
            "GITHUB_TOKEN in:file path:.github/workflows extension:yml language:yaml user:octo"
        );
        assert!(search_query("octo", Some("hello")).ends_with(" repo:octo/hello"));
    }

    #[tokio::test]
    async fn test_paginates_with_pause() {
        let server = MockServer::start().await;
        let first: Vec<_> = (0..SEARCH_PAGE_SIZE)
            .map(|i| item("svc", &format!("w{i}.yml")))
            .collect();
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .and(query_param("page", "1"))
            .and(query_param("q", search_query("acme", None)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"total_count": 101, "items": first})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 101,
                "items": [item("web", "ci.yml")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hits = search_workflow_files(&gateway(&server), "acme", None, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(hits.len(), 101);
        assert_eq!(hits[100].repository, RepositoryRef::new("acme", "web"));
        assert_eq!(hits[100].path, ".github/workflows/ci.yml");
    }

    #[tokio::test]
    async fn test_stops_at_search_window() {
        let server = MockServer::start().await;
        let full: Vec<_> = (0..SEARCH_PAGE_SIZE)
            .map(|i| item("svc", &format!("w{i}.yml")))
            .collect();
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .and(query_param("page", "11"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Only the first 1000 search results are available"
            })))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"total_count": 1500, "items": full})),
            )
            .expect(10)
            .mount(&server)
            .await;

        let hits = search_workflow_files(&gateway(&server), "acme", None, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(hits.len(), SEARCH_RESULT_LIMIT);
    }

    #[test]
    fn test_group_by_repository() {
        let hit = |repo: &str, file: &str| WorkflowHit {
            repository: RepositoryRef::new("o", repo),
            path: file.to_string(),
        };
        let groups = group_by_repository(vec![hit("b", "1"), hit("a", "2"), hit("b", "3")]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.name, "b");
        assert_eq!(groups[0].1, vec!["1", "3"]);
        assert_eq!(groups[1].0.name, "a");
    }
}
