//! Rate-limit aware access to the GitHub REST and GraphQL APIs.
//!
//! Every outbound request of a crawl goes through [`GitHubGateway::execute`].
//! Responses are classified as follows:
//!
//! - `401` → [`CrawlError::AuthenticationFailed`]
//! - `404`, `409` (empty repository), plain `403` → [`CrawlError::NotAccessible`]
//! - primary rate limit (`x-ratelimit-remaining: 0`) → sleep until reset, retry once
//! - secondary rate limit → warn, no retry, [`CrawlError::SecondaryRateLimit`]

use crate::config::CrawlConfig;
use crate::error::{CrawlError, Result};

use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Wait used when a rate-limited response carries no reset information.
const FALLBACK_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// A single logical API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    graphql: bool,
}

impl ApiRequest {
    /// A `GET` request to an absolute URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            body: None,
            graphql: false,
        }
    }

    /// A GraphQL `POST` to the given endpoint.
    pub fn graphql(endpoint: impl Into<String>, query: &str, variables: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url: endpoint.into(),
            query: Vec::new(),
            body: Some(serde_json::json!({ "query": query, "variables": variables })),
            graphql: true,
        }
    }

    /// Append a query-string parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Short description for log lines and error messages.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// A buffered successful response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub body: String,
}

impl ApiResponse {
    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    message: String,
}

/// Outcome of inspecting one HTTP response.
#[derive(Debug)]
enum Signal {
    Success,
    PrimaryRateLimit(Duration),
    SecondaryRateLimit,
    Failure(CrawlError),
}

/// Throttled GitHub API gateway.
pub struct GitHubGateway {
    client: Client,
    token: String,
    api_url: String,
    graphql_url: String,
    max_rate_limit_wait: Duration,
}

impl GitHubGateway {
    /// Create a new gateway.
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(format!("actperm/{}", crate::VERSION))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CrawlError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            token: config.token.clone(),
            api_url: config.api_url.clone(),
            graphql_url: config.graphql_endpoint(),
            max_rate_limit_wait: config.max_rate_limit_wait,
        })
    }

    /// Absolute URL for a REST path such as `/users/octo`.
    ///
    /// Every `/`-separated segment is percent-encoded, so names holding
    /// `#`, `?` or `%` reach the server intact.
    pub fn rest_url(&self, path: &str) -> Result<String> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| CrawlError::InvalidConfig(format!("invalid endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| CrawlError::InvalidConfig(format!("{} cannot carry a path", self.api_url)))?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url.into())
    }

    /// Execute a request, waiting out one primary rate limit.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut waited_for_reset = false;

        loop {
            debug!(request = %request.describe(), retry = waited_for_reset, "GitHub request");

            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .header("Authorization", format!("Bearer {}", self.token))
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28");
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| CrawlError::NetworkError(e.to_string()))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .text()
                .await
                .map_err(|e| CrawlError::NetworkError(e.to_string()))?;

            match classify(request, status, &headers, &body) {
                Signal::Success => {
                    return Ok(ApiResponse { body })
                }
                Signal::PrimaryRateLimit(wait) => {
                    warn!(
                        request = %request.describe(),
                        "Request quota exhausted"
                    );
                    if waited_for_reset {
                        return Err(CrawlError::RateLimitExceeded(wait.as_secs()));
                    }
                    let wait = wait.min(self.max_rate_limit_wait);
                    warn!(wait_secs = wait.as_secs(), "Retrying after rate limit reset");
                    tokio::time::sleep(wait).await;
                    waited_for_reset = true;
                }
                Signal::SecondaryRateLimit => {
                    warn!(request = %request.describe(), "Secondary rate limit (abuse detection) triggered");
                    return Err(CrawlError::SecondaryRateLimit(request.describe()));
                }
                Signal::Failure(error) => return Err(error),
            }
        }
    }

    /// `GET` a REST path and deserialize the body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(&ApiRequest::get(self.rest_url(path)?))
            .await?
            .json()
    }

    /// Run a GraphQL query and return its `data` object.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let request = ApiRequest::graphql(&self.graphql_url, query, variables);
        let envelope: GraphQlEnvelope<T> = self.execute(&request).await?.json()?;
        envelope.data.ok_or_else(|| CrawlError::ApiError {
            status: 200,
            message: "GraphQL response without data".to_string(),
        })
    }
}

fn classify(request: &ApiRequest, status: StatusCode, headers: &HeaderMap, body: &str) -> Signal {
    match status.as_u16() {
        401 => Signal::Failure(CrawlError::AuthenticationFailed(
            "Bad credentials".to_string(),
        )),
        403 | 429 => {
            if header_str(headers, "x-ratelimit-remaining") == Some("0") {
                Signal::PrimaryRateLimit(reset_wait(headers))
            } else if headers.contains_key("retry-after")
                || body.to_ascii_lowercase().contains("secondary rate limit")
                || status == StatusCode::TOO_MANY_REQUESTS
            {
                Signal::SecondaryRateLimit
            } else {
                Signal::Failure(CrawlError::NotAccessible(request.url.clone()))
            }
        }
        404 | 409 | 451 => Signal::Failure(CrawlError::NotAccessible(request.url.clone())),
        _ if !status.is_success() => Signal::Failure(CrawlError::ApiError {
            status: status.as_u16(),
            message: body.to_string(),
        }),
        _ if request.graphql => classify_graphql(headers, body),
        _ => Signal::Success,
    }
}

fn classify_graphql(headers: &HeaderMap, body: &str) -> Signal {
    let Ok(envelope) = serde_json::from_str::<GraphQlEnvelope<serde_json::Value>>(body) else {
        return Signal::Success;
    };
    let Some(error) = envelope.errors.first() else {
        return Signal::Success;
    };

    match error.error_type.as_deref() {
        Some("RATE_LIMITED") => Signal::PrimaryRateLimit(reset_wait(headers)),
        Some("NOT_FOUND") | Some("FORBIDDEN") => {
            Signal::Failure(CrawlError::NotAccessible(error.message.clone()))
        }
        _ => Signal::Failure(CrawlError::ApiError {
            status: 200,
            message: error.message.clone(),
        }),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Time until the rate-limit window resets.
fn reset_wait(headers: &HeaderMap) -> Duration {
    if let Some(reset) = header_str(headers, "x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok())
    {
        let remaining = reset - Utc::now().timestamp();
        return Duration::from_secs(remaining.max(0) as u64);
    }
    if let Some(after) = header_str(headers, "retry-after").and_then(|v| v.parse::<u64>().ok()) {
        return Duration::from_secs(after);
    }
    FALLBACK_RATE_LIMIT_WAIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> GitHubGateway {
        let config = CrawlConfig::new("ghp_test")
            .with_api_url(server.uri())
            .with_max_rate_limit_wait(Duration::from_millis(10));
        GitHubGateway::new(&config).unwrap()
    }

    fn primary_limited() -> ResponseTemplate {
        ResponseTemplate::new(403)
            .insert_header("x-ratelimit-remaining", "0")
            .insert_header("x-ratelimit-reset", "0")
            .set_body_json(json!({"message": "API rate limit exceeded"}))
    }

    #[test]
    fn test_rest_url_encodes_segments() {
        let config = CrawlConfig::new("t").with_api_url("https://ghe.example.com/api/v3/");
        let gateway = GitHubGateway::new(&config).unwrap();

        assert_eq!(
            gateway.rest_url("/users/octo").unwrap(),
            "https://ghe.example.com/api/v3/users/octo"
        );
        assert_eq!(
            gateway
                .rest_url("/repos/o/r/contents/.github/workflows/ci#1 ?50%.yml")
                .unwrap(),
            "https://ghe.example.com/api/v3/repos/o/r/contents/.github/workflows/ci%231%20%3F50%25.yml"
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .get_json::<serde_json::Value>("/users/octo")
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::AuthenticationFailed(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_not_found_is_not_accessible() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/contents/.github/workflows"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .get_json::<serde_json::Value>("/repos/o/r/contents/.github/workflows")
            .await
            .unwrap_err();
        assert!(err.is_not_accessible());
    }

    #[tokio::test]
    async fn test_primary_rate_limit_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octo"))
            .respond_with(primary_limited())
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/octo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "User"})))
            .mount(&server)
            .await;

        let body: serde_json::Value = gateway(&server).get_json("/users/octo").await.unwrap();
        assert_eq!(body["type"], "User");
    }

    #[tokio::test]
    async fn test_second_primary_rate_limit_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octo"))
            .respond_with(primary_limited())
            .expect(2)
            .mount(&server)
            .await;

        let err = gateway(&server)
            .get_json::<serde_json::Value>("/users/octo")
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::RateLimitExceeded(_)));
    }

    #[tokio::test]
    async fn test_secondary_rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octo"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("retry-after", "60")
                    .set_body_json(json!({"message": "You have exceeded a secondary rate limit"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = gateway(&server)
            .get_json::<serde_json::Value>("/users/octo")
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::SecondaryRateLimit(_)));
    }

    #[tokio::test]
    async fn test_plain_forbidden_is_not_accessible() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/private"))
            .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "4999"))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .get_json::<serde_json::Value>("/repos/o/private")
            .await
            .unwrap_err();
        assert!(err.is_not_accessible());
    }

    #[tokio::test]
    async fn test_graphql_returns_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"viewer": {"login": "me"}}})),
            )
            .mount(&server)
            .await;

        let data: serde_json::Value = gateway(&server)
            .graphql("query { viewer { login } }", json!({}))
            .await
            .unwrap();
        assert_eq!(data["viewer"]["login"], "me");
    }

    #[tokio::test]
    async fn test_graphql_not_found_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"enterprise": null},
                "errors": [{"type": "NOT_FOUND", "message": "Could not resolve to an Enterprise"}]
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .graphql::<serde_json::Value>("query { enterprise { id } }", json!({}))
            .await
            .unwrap_err();
        assert!(err.is_not_accessible());
    }

    #[test]
    fn test_reset_wait_falls_back() {
        assert_eq!(reset_wait(&HeaderMap::new()), FALLBACK_RATE_LIMIT_WAIT);
    }
}
