//! Nested key extraction from parsed YAML documents.

use serde_yaml::Value;

/// Return every value stored under `key`, at any depth.
///
/// Traversal is depth-first and left-to-right. A matched value is taken as a
/// whole and not searched further; sibling branches still are. Only string
/// keys can match.
pub fn search(tree: &Value, key: &str) -> Vec<Value> {
    let mut found = Vec::new();
    collect(tree, key, &mut found);
    found
}

fn collect(node: &Value, key: &str, found: &mut Vec<Value>) {
    match node {
        Value::Mapping(map) => {
            for (k, v) in map {
                if k.as_str() == Some(key) {
                    found.push(v.clone());
                } else {
                    collect(v, key, found);
                }
            }
        }
        Value::Sequence(items) => {
            for item in items {
                collect(item, key, found);
            }
        }
        Value::Tagged(tagged) => collect(&tagged.value, key, found),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}
