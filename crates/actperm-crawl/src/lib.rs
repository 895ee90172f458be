//! # actperm crawl engine
//!
//! Walks an enterprise, an owner account or a single repository on GitHub
//! and reports the `permissions` declared by every GitHub Actions workflow
//! it can read.
//!
//! ## Features
//!
//! - **Enumeration**: enterprise organizations and owned repositories through
//!   GraphQL, with cursor pagination
//! - **Resolution**: workflow files through the contents API, decoded and
//!   searched for `permissions` at any depth
//! - **Rate limits**: primary limits are waited out once, secondary limits
//!   are reported
//! - **Isolation**: one unreadable organization or repository never stops a
//!   crawl; bad credentials always do
//!
//! ## Example
//!
//! ```rust,ignore
//! use actperm_crawl::{CrawlConfig, CrawlScope, Crawler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CrawlConfig::from_env();
//!     let scope = CrawlScope::owner_or_repository("octo-org")?;
//!
//!     let report = Crawler::new(&config, scope)?.crawl().await;
//!     for record in &report.records {
//!         println!("{}/{} {}", record.owner, record.repo, record.workflow_path);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod orgs;
pub mod pagination;
pub mod progress;
pub mod repos;
pub mod search;
pub mod types;
pub mod workflows;

// Re-export main types
pub use config::{CrawlConfig, DiscoveryStrategy};
pub use crawler::{crawl, Crawler};
pub use error::{CrawlError, Result};
pub use gateway::GitHubGateway;
pub use progress::{ConsoleProgressReporter, CrawlPhase, CrawlProgress, ProgressCallback};
pub use types::*;

/// Version of the crawl engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
