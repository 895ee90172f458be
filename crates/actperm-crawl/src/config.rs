//! Crawl configuration.

use crate::error::{CrawlError, Result};
use std::time::Duration;
use url::Url;

/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default delay between two repository resolutions.
pub const DEFAULT_REPOSITORY_PACING: Duration = Duration::from_secs(2);

/// Pause between code-search result pages (search allows ~30 requests/minute).
pub const DEFAULT_SEARCH_PAGE_PAUSE: Duration = Duration::from_secs(3);

/// Upper bound on a single primary rate-limit wait.
pub const DEFAULT_MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3600);

/// How workflow files are located for an owner or repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryStrategy {
    /// List repositories, then walk `.github/workflows` in each.
    #[default]
    Listing,
    /// Locate workflow files through the code search API.
    CodeSearch,
}

/// Configuration for a crawl.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Bearer token presented on every request.
    pub token: String,

    /// REST API base URL.
    pub api_url: String,

    /// GraphQL endpoint (defaults to `{api_url}/graphql`).
    pub graphql_url: Option<String>,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Minimum delay between two repository resolutions.
    pub repository_pacing: Duration,

    /// Pause between code-search result pages.
    pub search_page_pause: Duration,

    /// Longest time the gateway will sleep for a primary rate-limit reset.
    pub max_rate_limit_wait: Duration,

    /// Discovery strategy.
    pub strategy: DiscoveryStrategy,
}

impl CrawlConfig {
    /// Create a configuration for the public GitHub API.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            graphql_url: None,
            request_timeout: Duration::from_secs(30),
            repository_pacing: DEFAULT_REPOSITORY_PACING,
            search_page_pause: DEFAULT_SEARCH_PAGE_PAUSE,
            max_rate_limit_wait: DEFAULT_MAX_RATE_LIMIT_WAIT,
            strategy: DiscoveryStrategy::default(),
        }
    }

    /// Build from `GITHUB_TOKEN`, `GITHUB_API_URL` and `GITHUB_GRAPHQL_URL`.
    ///
    /// Unset variables keep their defaults. The result is not validated, so
    /// callers can still override the token before [`validate`](Self::validate).
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new(lookup("GITHUB_TOKEN").unwrap_or_default());
        if let Some(api_url) = lookup("GITHUB_API_URL") {
            config = config.with_api_url(api_url);
        }
        if let Some(graphql_url) = lookup("GITHUB_GRAPHQL_URL") {
            config = config.with_graphql_url(graphql_url);
        }
        config
    }

    /// Replace the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the REST API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the GraphQL endpoint.
    pub fn with_graphql_url(mut self, url: impl Into<String>) -> Self {
        self.graphql_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the delay between repository resolutions.
    pub fn with_repository_pacing(mut self, pacing: Duration) -> Self {
        self.repository_pacing = pacing;
        self
    }

    /// Set the pause between code-search pages.
    pub fn with_search_page_pause(mut self, pause: Duration) -> Self {
        self.search_page_pause = pause;
        self
    }

    /// Cap the primary rate-limit wait.
    pub fn with_max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = wait;
        self
    }

    /// Set the discovery strategy.
    pub fn with_strategy(mut self, strategy: DiscoveryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Resolved GraphQL endpoint.
    pub fn graphql_endpoint(&self) -> String {
        self.graphql_url
            .clone()
            .unwrap_or_else(|| format!("{}/graphql", self.api_url))
    }

    /// Check that a token is present and the endpoints are valid URLs.
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(CrawlError::InvalidConfig(
                "GitHub Personal Access Token (PAT) not provided".to_string(),
            ));
        }
        for endpoint in [self.api_url.clone(), self.graphql_endpoint()] {
            Url::parse(&endpoint).map_err(|e| {
                CrawlError::InvalidConfig(format!("invalid endpoint '{endpoint}': {e}"))
            })?;
        }
        Ok(())
    }
}
