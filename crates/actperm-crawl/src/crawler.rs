//! Crawl orchestration.
//!
//! A [`Crawler`] is bound to one [`CrawlScope`] and walks it in two steps:
//!
//! 1. **Plan**: work out the full list of repositories to resolve
//!    (enterprise → organizations → repositories, owner → repositories, or
//!    the single repository given).
//! 2. **Resolve**: fetch workflow permissions repository by repository, with
//!    a fixed pause in between.
//!
//! Failures are isolated per organization and per repository. Only an
//! authentication failure stops the crawl, and records gathered up to that
//! point stay in the report.

use crate::config::{CrawlConfig, DiscoveryStrategy};
use crate::error::{CrawlError, Result};
use crate::gateway::GitHubGateway;
use crate::orgs::enumerate_organizations;
use crate::progress::{CrawlPhase, CrawlProgress};
use crate::repos::{enumerate_repositories, fetch_owner_kind};
use crate::search::{group_by_repository, search_workflow_files};
use crate::types::{
    CrawlReport, CrawlScope, Organization, OwnerKind, RepositoryRef, WorkflowPermissionRecord,
};
use crate::workflows::{resolve_workflow_file, resolve_workflow_permissions};

use std::time::Duration;
use tracing::{error, info, warn};

/// A repository queued for resolution.
#[derive(Debug, Clone)]
struct ResolutionTarget {
    repository: RepositoryRef,
    /// Files already located by code search; `None` means list the directory.
    files: Option<Vec<String>>,
}

impl ResolutionTarget {
    fn listing(repository: RepositoryRef) -> Self {
        Self {
            repository,
            files: None,
        }
    }
}

/// Fixed delay between successive repository resolutions.
struct Pacer {
    interval: Duration,
    started: bool,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: false,
        }
    }

    async fn wait(&mut self) {
        if self.started && !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        self.started = true;
    }
}

/// Drives a full permissions crawl for one scope.
pub struct Crawler {
    gateway: GitHubGateway,
    scope: CrawlScope,
    strategy: DiscoveryStrategy,
    repository_pacing: Duration,
    search_page_pause: Duration,
    progress: CrawlProgress,
}

impl Crawler {
    /// Create a crawler for `scope`.
    pub fn new(config: &CrawlConfig, scope: CrawlScope) -> Result<Self> {
        Ok(Self {
            gateway: GitHubGateway::new(config)?,
            scope,
            strategy: config.strategy,
            repository_pacing: config.repository_pacing,
            search_page_pause: config.search_page_pause,
            progress: CrawlProgress::new(),
        })
    }

    /// Set a progress tracker.
    pub fn with_progress(mut self, progress: CrawlProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Run the crawl.
    ///
    /// Never fails as a whole: non-fatal problems end up in
    /// [`CrawlReport::skipped`], an authentication failure in
    /// [`CrawlReport::fatal`].
    pub async fn crawl(&self) -> CrawlReport {
        let mut report = CrawlReport::new();
        info!(
            scope = %self.scope.target(),
            strategy = ?self.strategy,
            "Gathering GitHub Actions permissions"
        );
        self.progress.set_phase(CrawlPhase::Initializing, 1);

        match self.plan(&mut report).await {
            Ok(targets) => self.resolve_all(&targets, &mut report).await,
            Err(e) => {
                error!(scope = %self.scope.target(), error = %e, "Crawl aborted");
                report.set_fatal(self.scope.target(), &e);
            }
        }

        self.progress.set_phase(CrawlPhase::Complete, 1);
        report.complete();
        info!(
            records = report.records.len(),
            repositories = report.repositories,
            skipped = report.skipped.len(),
            "Crawl finished"
        );
        report
    }

    async fn plan(&self, report: &mut CrawlReport) -> Result<Vec<ResolutionTarget>> {
        match (&self.scope, self.strategy) {
            (CrawlScope::Repository(repo), DiscoveryStrategy::Listing) => {
                Ok(vec![ResolutionTarget::listing(repo.clone())])
            }
            (CrawlScope::Repository(repo), DiscoveryStrategy::CodeSearch) => {
                self.search_owners(&[repo.owner.clone()], Some(&repo.name), report)
                    .await
            }
            (CrawlScope::Owner(login), DiscoveryStrategy::Listing) => {
                self.list_owner(login, report).await
            }
            (CrawlScope::Owner(login), DiscoveryStrategy::CodeSearch) => {
                self.search_owners(&[login.clone()], None, report).await
            }
            (CrawlScope::Enterprise(slug), strategy) => {
                let organizations = self.list_organizations(slug, report).await?;
                match strategy {
                    DiscoveryStrategy::Listing => {
                        self.list_organization_repositories(&organizations, report)
                            .await
                    }
                    DiscoveryStrategy::CodeSearch => {
                        self.search_owners(&organizations, None, report).await
                    }
                }
            }
        }
    }

    async fn list_organizations(
        &self,
        enterprise: &str,
        report: &mut CrawlReport,
    ) -> Result<Vec<Organization>> {
        self.progress
            .set_phase(CrawlPhase::EnumeratingOrganizations, 1);
        let organizations = isolate(
            report,
            enterprise,
            enumerate_organizations(&self.gateway, enterprise).await,
        )?;
        info!(
            enterprise,
            organizations = organizations.len(),
            "Searching organizations"
        );
        Ok(organizations)
    }

    async fn list_organization_repositories(
        &self,
        organizations: &[Organization],
        report: &mut CrawlReport,
    ) -> Result<Vec<ResolutionTarget>> {
        self.progress.set_phase(
            CrawlPhase::EnumeratingRepositories,
            organizations.len() as u64,
        );

        let mut targets = Vec::new();
        for org in organizations {
            let repos = isolate(
                report,
                org,
                enumerate_repositories(&self.gateway, org, OwnerKind::Organization).await,
            )?;
            targets.extend(repos.into_iter().map(ResolutionTarget::listing));
            self.progress.increment(Some(org));
        }
        Ok(targets)
    }

    async fn list_owner(
        &self,
        login: &str,
        report: &mut CrawlReport,
    ) -> Result<Vec<ResolutionTarget>> {
        self.progress.set_phase(CrawlPhase::EnumeratingRepositories, 1);

        let kind = match fetch_owner_kind(&self.gateway, login).await {
            Ok(kind) => kind,
            Err(e) => {
                skip_unless_fatal(report, login, e)?;
                return Ok(Vec::new());
            }
        };
        let repos = isolate(
            report,
            login,
            enumerate_repositories(&self.gateway, login, kind).await,
        )?;
        self.progress.increment(Some(login));

        Ok(repos.into_iter().map(ResolutionTarget::listing).collect())
    }

    async fn search_owners(
        &self,
        owners: &[String],
        repo: Option<&str>,
        report: &mut CrawlReport,
    ) -> Result<Vec<ResolutionTarget>> {
        self.progress
            .set_phase(CrawlPhase::SearchingCode, owners.len() as u64);

        let mut targets = Vec::new();
        for owner in owners {
            let label = match repo {
                Some(repo) => format!("{owner}/{repo}"),
                None => owner.clone(),
            };
            let hits = isolate(
                report,
                &label,
                search_workflow_files(&self.gateway, owner, repo, self.search_page_pause).await,
            )?;
            targets.extend(
                group_by_repository(hits)
                    .into_iter()
                    .map(|(repository, files)| ResolutionTarget {
                        repository,
                        files: Some(files),
                    }),
            );
            self.progress.increment(Some(&label));
        }
        Ok(targets)
    }

    async fn resolve_all(&self, targets: &[ResolutionTarget], report: &mut CrawlReport) {
        report.repositories = targets.len();
        self.progress
            .set_phase(CrawlPhase::ResolvingWorkflows, targets.len() as u64);

        let mut pacer = Pacer::new(self.repository_pacing);
        for target in targets {
            pacer.wait().await;

            let name = target.repository.to_string();
            match self.resolve(target).await {
                Ok(records) => report.records.extend(records),
                Err(e) if e.is_fatal() => {
                    error!(repository = %name, error = %e, "Crawl aborted");
                    report.set_fatal(name, &e);
                    return;
                }
                Err(e) => {
                    warn!(repository = %name, error = %e, "Skipping repository");
                    report.add_skipped(name.as_str(), &e);
                }
            }
            self.progress.increment(Some(&name));
        }
    }

    async fn resolve(&self, target: &ResolutionTarget) -> Result<Vec<WorkflowPermissionRecord>> {
        let RepositoryRef { owner, name } = &target.repository;
        let Some(files) = &target.files else {
            return resolve_workflow_permissions(&self.gateway, owner, name).await;
        };

        let mut records = Vec::new();
        for path in files {
            if let Some(record) = resolve_workflow_file(&self.gateway, owner, name, path).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Turn a non-fatal failure into an empty result recorded as skipped.
fn isolate<T>(report: &mut CrawlReport, target: &str, result: Result<Vec<T>>) -> Result<Vec<T>> {
    match result {
        Ok(items) => Ok(items),
        Err(e) => skip_unless_fatal(report, target, e).map(|()| Vec::new()),
    }
}

fn skip_unless_fatal(report: &mut CrawlReport, target: &str, error: CrawlError) -> Result<()> {
    if error.is_fatal() {
        return Err(error);
    }
    warn!(
        scope = target,
        error = %error,
        "Cannot be crawled: the resource does not exist or you do not have permission to view it"
    );
    report.add_skipped(target, &error);
    Ok(())
}

/// Convenience wrapper: build a crawler and run it.
pub async fn crawl(config: &CrawlConfig, scope: CrawlScope) -> Result<CrawlReport> {
    let crawler = Crawler::new(config, scope)?;
    Ok(crawler.crawl().await)
}
