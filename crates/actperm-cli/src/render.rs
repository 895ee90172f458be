//! Report renderers: JSON, CSV and Markdown.

use actperm_crawl::WorkflowPermissionRecord;
use anyhow::Context;
use serde::Serialize;
use serde_json::Value as JsonValue;
use serde_yaml::Value;
use std::fmt::Write as _;
use std::path::Path;

const CSV_HEADER: &str = "owner,repo,workflow,permissions";
const MARKDOWN_HEADER: &str = "owner | repo | workflow | permissions\n----- | ----- | ----- | -----\n";

/// JSON shape of one record.
#[derive(Serialize)]
struct JsonRecord<'a> {
    owner: &'a str,
    repo: &'a str,
    workflow: &'a str,
    permissions: Vec<JsonValue>,
}

impl<'a> From<&'a WorkflowPermissionRecord> for JsonRecord<'a> {
    fn from(record: &'a WorkflowPermissionRecord) -> Self {
        Self {
            owner: &record.owner,
            repo: &record.repo,
            workflow: &record.workflow_path,
            permissions: record.permissions.iter().map(to_json).collect(),
        }
    }
}

/// Pretty-printed JSON array of records.
pub fn render_json(records: &[WorkflowPermissionRecord]) -> anyhow::Result<String> {
    let rows: Vec<JsonRecord<'_>> = records.iter().map(JsonRecord::from).collect();
    serde_json::to_string_pretty(&rows).context("failed to serialize records")
}

/// Convert a YAML value to JSON. Mapping keys that are not strings are
/// flattened to text, so every YAML document has a JSON form.
fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::from(i)
            } else if let Some(u) = n.as_u64() {
                JsonValue::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(JsonValue::Null, JsonValue::Number)
            }
        }
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Sequence(items) => JsonValue::Array(items.iter().map(to_json).collect()),
        Value::Mapping(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (flatten(k), to_json(v)))
                .collect(),
        ),
        Value::Tagged(tagged) => to_json(&tagged.value),
    }
}

/// CSV with one row per record and a flattened permissions cell.
pub fn render_csv(records: &[WorkflowPermissionRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push_str("\r\n");
    for record in records {
        let permissions = flatten_permissions(&record.permissions);
        let row = [
            record.owner.as_str(),
            record.repo.as_str(),
            record.workflow_path.as_str(),
            permissions.as_str(),
        ]
        .map(csv_field)
        .join(",");
        out.push_str(&row);
        out.push_str("\r\n");
    }
    out
}

/// Markdown table linking every workflow file.
pub fn render_markdown(records: &[WorkflowPermissionRecord]) -> String {
    let mut out = String::from(MARKDOWN_HEADER);
    for record in records {
        let permissions =
            JsonValue::Array(record.permissions.iter().map(to_json).collect()).to_string();
        let _ = writeln!(
            out,
            "{} | {} | [{}]({}) | {}",
            markdown_cell(&record.owner),
            markdown_cell(&record.repo),
            markdown_link_text(&record.workflow_path),
            markdown_link_target(&record.html_url()),
            markdown_cell(&permissions),
        );
    }
    out
}

/// Flatten extracted permission blocks into a single line.
///
/// `[{contents: read, id-token: write}, read-all]` becomes
/// `contents: read, id-token: write; read-all`.
pub fn flatten_permissions(blocks: &[Value]) -> String {
    blocks.iter().map(flatten).collect::<Vec<_>>().join("; ")
}

fn flatten(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) => items.iter().map(flatten).collect::<Vec<_>>().join(", "),
        Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", flatten(k), flatten(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Tagged(tagged) => flatten(&tagged.value),
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn markdown_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn markdown_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']' | '|') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Percent-encode the characters that would end a link destination early or
/// turn part of the path into a query or fragment.
fn markdown_link_target(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            ' ' | '#' | '?' | '%' | '(' | ')' | '[' | ']' | '<' | '>' | '|' => {
                let _ = write!(out, "%{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Write a rendered report, creating the file if needed.
pub fn write_report(path: &Path, contents: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(workflow: &str, permissions: &str) -> WorkflowPermissionRecord {
        let document: Value = serde_yaml::from_str(permissions).unwrap();
        WorkflowPermissionRecord {
            owner: "acme".into(),
            repo: "api".into(),
            workflow_path: format!(".github/workflows/{workflow}"),
            permissions: match document {
                Value::Sequence(blocks) => blocks,
                Value::Null => Vec::new(),
                other => vec![other],
            },
        }
    }

    #[test]
    fn test_flatten_permissions() {
        let blocks: Vec<Value> = serde_yaml::from_str(
            "- contents: read\n  id-token: write\n- read-all\n- [issues, 3, true]\n",
        )
        .unwrap();
        assert_eq!(
            flatten_permissions(&blocks),
            "contents: read, id-token: write; read-all; issues, 3, true"
        );
        assert_eq!(flatten_permissions(&[]), "");
    }

    #[test]
    fn test_render_csv_quotes_fields() {
        let csv = render_csv(&[
            record("ci.yml", "[{contents: read, packages: write}]"),
            record("plain.yml", "[read-all]"),
            record("none.yml", "~"),
        ]);
        let lines: Vec<_> = csv.split("\r\n").collect();

        assert_eq!(lines[0], "owner,repo,workflow,permissions");
        assert_eq!(
            lines[1],
            "acme,api,.github/workflows/ci.yml,\"contents: read, packages: write\""
        );
        assert_eq!(lines[2], "acme,api,.github/workflows/plain.yml,read-all");
        assert_eq!(lines[3], "acme,api,.github/workflows/none.yml,");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_render_markdown_links_workflows() {
        let md = render_markdown(&[record("deploy.yml", "[{contents: write}]")]);
        let lines: Vec<_> = md.lines().collect();

        assert_eq!(lines[0], "owner | repo | workflow | permissions");
        assert_eq!(lines[1], "----- | ----- | ----- | -----");
        assert_eq!(
            lines[2],
            "acme | api | [.github/workflows/deploy.yml](https://github.com/acme/api/blob/HEAD/.github/workflows/deploy.yml) | [{\"contents\":\"write\"}]"
        );
    }

    #[test]
    fn test_markdown_escapes_link_characters() {
        let md = render_markdown(&[record("a[1](b) #x.yml", "[read-all]")]);
        let row = md.lines().nth(2).unwrap();

        assert_eq!(
            row,
            "acme | api | [.github/workflows/a\\[1\\](b) #x.yml](https://github.com/acme/api/blob/HEAD/.github/workflows/a%5B1%5D%28b%29%20%23x.yml) | [\"read-all\"]"
        );
    }

    #[test]
    fn test_non_string_keys_still_render() {
        let records = [record("odd.yml", "[{~: read, 1: write, contents: read}]")];

        let json = render_json(&records).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let permissions = &parsed[0]["permissions"][0];
        assert_eq!(permissions["null"], "read");
        assert_eq!(permissions["1"], "write");
        assert_eq!(permissions["contents"], "read");

        assert!(render_markdown(&records).contains("\"null\":\"read\""));
    }

    #[test]
    fn test_render_json_uses_workflow_field() {
        let json = render_json(&[record("ci.yml", "[read-all]")]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["workflow"], ".github/workflows/ci.yml");
        assert_eq!(parsed[0]["permissions"][0], "read-all");
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        write_report(&path, MARKDOWN_HEADER).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), MARKDOWN_HEADER);

        let missing = dir.path().join("no/such/dir/report.csv");
        assert!(write_report(&missing, "x").is_err());
    }
}
