//! Repository enumeration for an organization or user account.

use crate::error::{CrawlError, Result};
use crate::gateway::GitHubGateway;
use crate::pagination::{collect_pages, Connection};
use crate::types::{OwnerKind, RepositoryRef};

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

/// Repositories fetched per page.
pub const REPOSITORIES_PAGE_SIZE: u32 = 100;

fn repositories_query(kind: OwnerKind) -> String {
    format!(
        r#"query ($login: String!, $cursor: String = null) {{
  owner: {field}(login: $login) {{
    repositories(
      first: {REPOSITORIES_PAGE_SIZE}
      after: $cursor
      ownerAffiliations: OWNER
      isFork: false
      orderBy: {{field: PUSHED_AT, direction: DESC}}
    ) {{
      nodes {{
        name
        isArchived
        owner {{
          login
        }}
      }}
      pageInfo {{
        hasNextPage
        endCursor
      }}
    }}
  }}
}}"#,
        field = kind.graphql_field()
    )
}

#[derive(Debug, Deserialize)]
struct OwnerData {
    owner: Option<OwnerNode>,
}

#[derive(Debug, Deserialize)]
struct OwnerNode {
    repositories: Connection<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    name: String,
    #[serde(default)]
    is_archived: bool,
    owner: LoginNode,
}

#[derive(Debug, Deserialize)]
struct LoginNode {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(rename = "type")]
    account_type: String,
}

/// Look up whether a login is an organization or a user.
pub async fn fetch_owner_kind(gateway: &GitHubGateway, login: &str) -> Result<OwnerKind> {
    let account: Account = gateway.get_json(&format!("/users/{login}")).await?;
    let kind = OwnerKind::from_account_type(&account.account_type);
    debug!(login, %kind, "Resolved account type");
    Ok(kind)
}

/// List an account's own, non-fork, non-archived repositories.
///
/// Results keep the API order (most recently pushed first). Entries whose
/// reported owner is not exactly `owner` are dropped.
pub async fn enumerate_repositories(
    gateway: &GitHubGateway,
    owner: &str,
    kind: OwnerKind,
) -> Result<Vec<RepositoryRef>> {
    let query = repositories_query(kind);
    let query = query.as_str();

    let nodes = collect_pages(|cursor| async move {
        debug!(owner, %kind, cursor = ?cursor, "Fetching repositories page");
        let data: OwnerData = gateway
            .graphql(query, json!({ "login": owner, "cursor": cursor }))
            .await?;
        data.owner
            .map(|o| o.repositories)
            .ok_or_else(|| CrawlError::NotAccessible(format!("{kind} {owner}")))
    })
    .await?;

    let total = nodes.len();
    let repositories: Vec<RepositoryRef> = nodes
        .into_iter()
        .filter(|node| !node.is_archived)
        .filter(|node| {
            let matches = node.owner.login == owner;
            if !matches {
                debug!(
                    owner,
                    reported = %node.owner.login,
                    repo = %node.name,
                    "Dropping repository listed under another owner"
                );
            }
            matches
        })
        .map(|node| RepositoryRef::new(owner, node.name))
        .collect();

    info!(
        owner,
        %kind,
        listed = total,
        kept = repositories.len(),
        "Enumerated repositories"
    );
    Ok(repositories)
}
