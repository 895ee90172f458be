//! Common types for crawl operations.

use crate::error::{CrawlError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Login of an organization that belongs to an enterprise.
pub type Organization = String;

/// A repository selected for workflow resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Owning account login, always the account that was queried.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepositoryRef {
    /// Create a new repository reference.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse an `owner/repo` slug.
    pub fn from_slug(slug: &str) -> Result<Self> {
        match slug.split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(Self::new(*owner, *name)),
            _ => Err(CrawlError::InvalidConfig(format!(
                "Invalid repository format: {slug}. Expected 'owner/repo'"
            ))),
        }
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Permissions declared by one workflow file.
///
/// `permissions` holds every value found under a `permissions` key, in
/// document order. An empty list means the workflow declares none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPermissionRecord {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "workflow")]
    pub workflow_path: String,
    pub permissions: Vec<serde_yaml::Value>,
}

impl WorkflowPermissionRecord {
    /// Web URL of the workflow file on the default branch.
    pub fn html_url(&self) -> String {
        format!(
            "https://github.com/{}/{}/blob/HEAD/{}",
            self.owner, self.repo, self.workflow_path
        )
    }
}

/// Case-insensitive ordering on workflow path.
fn by_workflow_path(a: &WorkflowPermissionRecord, b: &WorkflowPermissionRecord) -> Ordering {
    a.workflow_path
        .to_uppercase()
        .cmp(&b.workflow_path.to_uppercase())
}

/// Stable sort by workflow path, ignoring case.
pub fn sort_records(records: &mut [WorkflowPermissionRecord]) {
    records.sort_by(by_workflow_path);
}

/// Account type behind a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Organization,
    User,
}

impl OwnerKind {
    /// Map the REST `type` field (`"Organization"`, `"User"`, `"Bot"`).
    pub fn from_account_type(account_type: &str) -> Self {
        if account_type.eq_ignore_ascii_case("organization") {
            Self::Organization
        } else {
            Self::User
        }
    }

    /// GraphQL root field used to look up this kind of account.
    pub fn graphql_field(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Organization => write!(f, "organization"),
            Self::User => write!(f, "user"),
        }
    }
}

/// What to crawl. Exactly one variant is chosen per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlScope {
    /// Every organization of an enterprise account.
    Enterprise(String),
    /// Every repository of an organization or user.
    Owner(String),
    /// One repository.
    Repository(RepositoryRef),
}

impl CrawlScope {
    /// Scope for an owner login, or a single repository when given `owner/repo`.
    pub fn owner_or_repository(value: &str) -> Result<Self> {
        if value.contains('/') {
            RepositoryRef::from_slug(value).map(Self::Repository)
        } else if value.is_empty() {
            Err(CrawlError::InvalidConfig("owner must not be empty".into()))
        } else {
            Ok(Self::Owner(value.to_string()))
        }
    }

    /// Human-readable target name.
    pub fn target(&self) -> String {
        match self {
            Self::Enterprise(slug) => slug.clone(),
            Self::Owner(login) => login.clone(),
            Self::Repository(repo) => repo.to_string(),
        }
    }
}

/// A target that could not be crawled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlFailure {
    /// Organization, owner, or `owner/repo` that failed.
    pub target: String,

    /// Error category (see [`CrawlError::category`]).
    pub category: String,

    /// Error message.
    pub message: String,
}

impl CrawlFailure {
    pub fn new(target: impl Into<String>, error: &CrawlError) -> Self {
        Self {
            target: target.into(),
            category: error.category().to_string(),
            message: error.to_string(),
        }
    }
}

/// Outcome of a crawl.
///
/// Records collected before a fatal error are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlReport {
    /// Records sorted by workflow path, ignoring case.
    pub records: Vec<WorkflowPermissionRecord>,

    /// Targets skipped because of non-fatal errors.
    pub skipped: Vec<CrawlFailure>,

    /// The error that aborted the crawl, if any.
    pub fatal: Option<CrawlFailure>,

    /// Number of repositories selected for resolution.
    pub repositories: usize,

    /// Start time of the crawl.
    pub started_at: Option<DateTime<Utc>>,

    /// End time of the crawl.
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Sort records and stamp the completion time.
    pub fn complete(&mut self) {
        sort_records(&mut self.records);
        self.completed_at = Some(Utc::now());
    }

    /// Whether the crawl ran to the end.
    pub fn is_successful(&self) -> bool {
        self.fatal.is_none()
    }

    /// Record a target skipped because of a non-fatal error.
    pub fn add_skipped(&mut self, target: impl Into<String>, error: &CrawlError) {
        self.skipped.push(CrawlFailure::new(target, error));
    }

    /// Record the error that aborted the crawl.
    pub fn set_fatal(&mut self, target: impl Into<String>, error: &CrawlError) {
        self.fatal = Some(CrawlFailure::new(target, error));
    }

    /// Get the duration of the crawl.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
