//! actperm - report the permissions GitHub Actions workflows declare.

use actperm_crawl::{
    ConsoleProgressReporter, CrawlConfig, CrawlProgress, CrawlReport, CrawlScope, Crawler,
    DiscoveryStrategy, RepositoryRef,
};
use anyhow::Context;
use clap::{ArgGroup, Parser};
use console::{style, Term};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod render;

/// Gather the `permissions` of GitHub Actions workflows
#[derive(Parser, Debug)]
#[command(name = "actperm")]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("scope")
        .required(true)
        .args(["enterprise", "owner", "repository"])
))]
struct Cli {
    /// Enterprise slug; every organization in it is crawled
    #[arg(short, long)]
    enterprise: Option<String>,

    /// Organization or user login (`owner/repo` crawls a single repository)
    #[arg(short, long)]
    owner: Option<String>,

    /// Single repository as `owner/repo`
    #[arg(short, long, value_name = "OWNER/REPO")]
    repository: Option<String>,

    /// Also write the records as CSV to this file
    #[arg(long, value_name = "PATH", value_parser = non_empty_path)]
    csv: Option<PathBuf>,

    /// Also write the records as a Markdown table to this file
    #[arg(long, value_name = "PATH", value_parser = non_empty_path)]
    md: Option<PathBuf>,

    /// GitHub token [default: $GITHUB_TOKEN]
    #[arg(short, long)]
    token: Option<String>,

    /// REST API base URL [default: $GITHUB_API_URL or https://api.github.com]
    #[arg(long)]
    api_url: Option<String>,

    /// GraphQL endpoint [default: $GITHUB_GRAPHQL_URL or `<api-url>/graphql`]
    #[arg(long)]
    graphql_url: Option<String>,

    /// Locate workflow files through code search instead of listing repositories
    #[arg(long)]
    search: bool,

    /// Seconds to wait between repositories
    #[arg(long, value_name = "SECONDS")]
    pacing_secs: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout_secs: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn non_empty_path(value: &str) -> Result<PathBuf, String> {
    if value.trim().is_empty() {
        Err("path must not be empty".to_string())
    } else {
        Ok(PathBuf::from(value))
    }
}

impl Cli {
    fn scope(&self) -> anyhow::Result<CrawlScope> {
        let scope = if let Some(enterprise) = &self.enterprise {
            CrawlScope::Enterprise(enterprise.clone())
        } else if let Some(owner) = &self.owner {
            CrawlScope::owner_or_repository(owner)?
        } else if let Some(repository) = &self.repository {
            CrawlScope::Repository(RepositoryRef::from_slug(repository)?)
        } else {
            anyhow::bail!("one of --enterprise, --owner or --repository is required");
        };
        Ok(scope)
    }

    fn config(&self) -> anyhow::Result<CrawlConfig> {
        let mut config = CrawlConfig::from_env();
        if let Some(token) = &self.token {
            config = config.with_token(token);
        }
        if let Some(api_url) = &self.api_url {
            config = config.with_api_url(api_url);
        }
        if let Some(graphql_url) = &self.graphql_url {
            config = config.with_graphql_url(graphql_url);
        }
        if let Some(secs) = self.pacing_secs {
            config = config.with_repository_pacing(Duration::from_secs(secs));
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if self.search {
            config = config.with_strategy(DiscoveryStrategy::CodeSearch);
        }
        config
            .validate()
            .context("a GitHub token is required (--token or GITHUB_TOKEN) and endpoints must be URLs")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("actperm={log_level},actperm_crawl={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&cli).await {
        Ok(report) if report.is_successful() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {e:#}", style("Error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<CrawlReport> {
    let scope = cli.scope()?;
    let config = cli.config()?;

    let mut crawler = Crawler::new(&config, scope)?;
    let reporter = (cli.verbose == 0 && Term::stderr().is_term()).then(ConsoleProgressReporter::new);
    if let Some(reporter) = &reporter {
        crawler = crawler.with_progress(CrawlProgress::with_callback(reporter.callback()));
    }

    let report = crawler.crawl().await;
    if let Some(reporter) = &reporter {
        reporter.finish("done");
    }

    println!("{}", render::render_json(&report.records)?);
    if let Some(path) = &cli.csv {
        info!(path = %path.display(), "Saving CSV report");
        render::write_report(path, &render::render_csv(&report.records))?;
    }
    if let Some(path) = &cli.md {
        info!(path = %path.display(), "Saving Markdown report");
        render::write_report(path, &render::render_markdown(&report.records))?;
    }

    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &CrawlReport) {
    let elapsed = report
        .duration()
        .and_then(|d| d.to_std().ok())
        .map(|d| format!(" in {:.1}s", d.as_secs_f64()))
        .unwrap_or_default();
    eprintln!(
        "{} {} workflows across {} repositories ({} skipped){elapsed}",
        style("Found").green().bold(),
        report.records.len(),
        report.repositories,
        report.skipped.len(),
    );
    if let Some(fatal) = &report.fatal {
        eprintln!(
            "{} crawl aborted at {}: {}",
            style("Error:").red().bold(),
            fatal.target,
            fatal.message,
        );
    }
}
