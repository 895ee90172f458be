//! Enterprise organization enumeration.

use crate::error::{CrawlError, Result};
use crate::gateway::GitHubGateway;
use crate::pagination::{collect_pages, Connection};
use crate::types::Organization;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

/// Organizations fetched per page.
pub const ORGANIZATIONS_PAGE_SIZE: u32 = 25;

const ORGANIZATIONS_QUERY: &str = r#"query ($enterprise: String!, $cursor: String = null) {
  enterprise(slug: $enterprise) {
    organizations(first: 25, after: $cursor) {
      nodes {
        login
      }
      pageInfo {
        hasNextPage
        endCursor
      }
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct EnterpriseData {
    enterprise: Option<EnterpriseNode>,
}

#[derive(Debug, Deserialize)]
struct EnterpriseNode {
    organizations: Connection<OrganizationNode>,
}

#[derive(Debug, Deserialize)]
struct OrganizationNode {
    login: String,
}

/// List the logins of every organization in an enterprise account.
pub async fn enumerate_organizations(
    gateway: &GitHubGateway,
    enterprise: &str,
) -> Result<Vec<Organization>> {
    let nodes = collect_pages(|cursor| async move {
        debug!(enterprise, cursor = ?cursor, "Fetching organizations page");
        let data: EnterpriseData = gateway
            .graphql(
                ORGANIZATIONS_QUERY,
                json!({ "enterprise": enterprise, "cursor": cursor }),
            )
            .await?;
        data.enterprise
            .map(|e| e.organizations)
            .ok_or_else(|| CrawlError::NotAccessible(format!("enterprise {enterprise}")))
    })
    .await?;

    let organizations: Vec<Organization> = nodes.into_iter().map(|n| n.login).collect();
    info!(
        enterprise,
        count = organizations.len(),
        "Enumerated enterprise organizations"
    );
    Ok(organizations)
}
