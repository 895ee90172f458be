//! Error types for crawl operations.

use thiserror::Error;

/// Crawl-specific errors.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The credential was rejected (HTTP 401). Aborts the whole crawl.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The resource does not exist or is not visible to the caller.
    #[error("Not accessible: {0}")]
    NotAccessible(String),

    /// Primary rate limit still exhausted after the single retry.
    #[error("Rate limit exceeded, resets in {0} seconds")]
    RateLimitExceeded(u64),

    /// Secondary (abuse detection) rate limit; never retried automatically.
    #[error("Secondary rate limit hit for {0}")]
    SecondaryRateLimit(String),

    /// API request failed with an unexpected status.
    #[error("API request failed ({status}): {message}")]
    ApiError {
        /// HTTP status code, `200` for GraphQL-level errors.
        status: u16,
        /// Response body or GraphQL error message.
        message: String,
    },

    /// Network error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File content could not be decoded to text.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Workflow file is not valid YAML.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl CrawlError {
    /// Whether this error must abort the crawl instead of being isolated.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// Whether this error means the target simply is not there for us.
    pub fn is_not_accessible(&self) -> bool {
        matches!(self, Self::NotAccessible(_))
    }

    /// Short, stable label used when recording failures in a report.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication",
            Self::NotAccessible(_) => "not_accessible",
            Self::RateLimitExceeded(_) => "rate_limit",
            Self::SecondaryRateLimit(_) => "secondary_rate_limit",
            Self::ApiError { .. } => "api",
            Self::NetworkError(_) | Self::HttpError(_) => "network",
            Self::InvalidConfig(_) => "config",
            Self::Decode(_) | Self::YamlParse(_) | Self::JsonError(_) => "content",
        }
    }
}

/// Result type for crawl operations.
pub type Result<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_authentication_is_fatal() {
        assert!(CrawlError::AuthenticationFailed("bad".into()).is_fatal());
        assert!(!CrawlError::NotAccessible("x".into()).is_fatal());
        assert!(!CrawlError::RateLimitExceeded(10).is_fatal());
        assert!(!CrawlError::SecondaryRateLimit("x".into()).is_fatal());
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(
            CrawlError::NotAccessible("o/r".into()).category(),
            "not_accessible"
        );
        assert_eq!(
            CrawlError::ApiError {
                status: 500,
                message: "boom".into()
            }
            .category(),
            "api"
        );
    }
}
