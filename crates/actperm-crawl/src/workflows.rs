//! Workflow permission resolution for a single repository.

use crate::error::{CrawlError, Result};
use crate::extract::search;
use crate::gateway::GitHubGateway;
use crate::types::{sort_records, WorkflowPermissionRecord};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

/// Directory GitHub Actions loads workflows from.
pub const WORKFLOWS_DIR: &str = ".github/workflows";

/// Key extracted from every workflow document.
pub const PERMISSIONS_KEY: &str = "permissions";

/// Entry of a contents directory listing.
#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
}

/// A single file from the contents API.
#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

/// Resolve the permissions of every workflow in `owner/repo`.
///
/// A repository without a workflows directory, or one we cannot read, yields
/// an empty list. Authentication failures still propagate. Records are
/// sorted by workflow path, ignoring case.
pub async fn resolve_workflow_permissions(
    gateway: &GitHubGateway,
    owner: &str,
    repo: &str,
) -> Result<Vec<WorkflowPermissionRecord>> {
    let listing = format!("/repos/{owner}/{repo}/contents/{WORKFLOWS_DIR}");
    let entries: Vec<ContentEntry> = match gateway.get_json(&listing).await {
        Ok(entries) => entries,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(owner, repo, error = %e, "No readable workflows directory");
            return Ok(Vec::new());
        }
    };

    let mut records = Vec::new();
    for entry in entries.iter().filter(|e| e.entry_type == "file") {
        if let Some(record) = resolve_workflow_file(gateway, owner, repo, &entry.path).await? {
            records.push(record);
        }
    }

    sort_records(&mut records);
    debug!(owner, repo, workflows = records.len(), "Resolved workflows");
    Ok(records)
}

/// Fetch one workflow file and extract its permissions.
///
/// Returns `None` when the file is not accessible or cannot be decoded and
/// parsed; one bad file never aborts the repository.
pub async fn resolve_workflow_file(
    gateway: &GitHubGateway,
    owner: &str,
    repo: &str,
    path: &str,
) -> Result<Option<WorkflowPermissionRecord>> {
    let file: FileContent = match gateway
        .get_json(&format!("/repos/{owner}/{repo}/contents/{path}"))
        .await
    {
        Ok(file) => file,
        Err(e) if e.is_not_accessible() => {
            warn!(owner, repo, path, "Workflow file not accessible, skipping");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let permissions = match decode_file(&file).and_then(|source| permissions_from_source(&source)) {
        Ok(permissions) => permissions,
        Err(e) => {
            warn!(owner, repo, path, error = %e, "Skipping unparseable workflow");
            return Ok(None);
        }
    };

    Ok(Some(WorkflowPermissionRecord {
        owner: owner.to_string(),
        repo: repo.to_string(),
        workflow_path: path.to_string(),
        permissions,
    }))
}

/// Parse workflow YAML and collect its `permissions` values.
pub fn permissions_from_source(source: &str) -> Result<Vec<serde_yaml::Value>> {
    let document: serde_yaml::Value = serde_yaml::from_str(source)?;
    Ok(search(&document, PERMISSIONS_KEY))
}

fn decode_file(file: &FileContent) -> Result<String> {
    match file.encoding.as_deref() {
        Some("base64") | None => {}
        Some(other) => {
            return Err(CrawlError::Decode(format!("unsupported encoding '{other}'")));
        }
    }
    let content = file
        .content
        .as_deref()
        .ok_or_else(|| CrawlError::Decode("file has no content".to_string()))?;
    decode_base64(content)
}

/// Decode contents-API base64, which is wrapped at 60 columns.
fn decode_base64(content: &str) -> Result<String> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| CrawlError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CrawlError::Decode(e.to_string()))
}
