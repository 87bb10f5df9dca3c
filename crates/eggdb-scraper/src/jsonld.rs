//! schema.org JSON-LD blocks embedded in product and store pages.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]+type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

/// Every JSON-LD node on the page, flattened.
///
/// Top-level arrays, `@graph` containers, and `ItemList` entries are
/// expanded so callers only need to filter by `@type`. Blocks that fail to
/// parse are skipped.
pub(crate) fn nodes(html: &str) -> Vec<Value> {
    let mut out = Vec::new();
    for cap in SCRIPT_RE.captures_iter(html) {
        let Some(text) = cap.get(1) else { continue };
        let Ok(value) = serde_json::from_str::<Value>(text.as_str().trim()) else {
            continue;
        };
        flatten(value, &mut out);
    }
    out
}

fn flatten(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        Value::Object(_) => {
            if let Some(graph) = value.get("@graph").cloned() {
                flatten(graph, out);
            }
            if let Some(Value::Array(entries)) = value.get("itemListElement").cloned() {
                for entry in entries {
                    match entry.get("item").cloned() {
                        Some(item) => flatten(item, out),
                        None => flatten(entry, out),
                    }
                }
            }
            out.push(value);
        }
        _ => {}
    }
}

/// `true` if the node's `@type` (string or array) matches any of `types`.
pub(crate) fn has_type(node: &Value, types: &[&str]) -> bool {
    match node.get("@type") {
        Some(Value::String(s)) => types.iter().any(|t| s.eq_ignore_ascii_case(t)),
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(Value::as_str)
            .any(|s| types.iter().any(|t| s.eq_ignore_ascii_case(t))),
        _ => false,
    }
}

/// A string or number field rendered as text.
pub(crate) fn text_field(node: &Value, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
