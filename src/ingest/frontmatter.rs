//! YAML frontmatter extraction (spec.md §4.11 step 1).
//!
//! Parsed with `serde_yaml` (already the crate's YAML backbone, per the
//! teacher's `adapter::declarative` module) rather than a hand-rolled
//! `key: value` line scanner, so nested/typed frontmatter values survive
//! into `Node::meta` instead of being flattened to strings. Malformed
//! frontmatter degrades to an empty map and a `warn` log (spec.md §7:
//! "Parse: malformed YAML frontmatter ... -> log warn, continue without
//! the affected entry").

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

static FRONTMATTER_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^---\r?\n(.*?)\r?\n---\r?\n?").unwrap());

/// Split `raw` into `(frontmatter key/value pairs, remaining body)`. A
/// missing or malformed frontmatter block yields an empty pair list and
/// the original text as the body.
pub fn parse_frontmatter(raw: &str) -> (Vec<(String, Value)>, String) {
    let Some(captures) = FRONTMATTER_BLOCK.captures(raw) else {
        return (Vec::new(), raw.to_string());
    };

    let whole = captures.get(0).unwrap();
    let yaml_block = &captures[1];
    let body = raw[whole.end()..].to_string();

    match serde_yaml::from_str::<serde_yaml::Value>(yaml_block) {
        Ok(serde_yaml::Value::Mapping(map)) => {
            let pairs = map
                .into_iter()
                .filter_map(|(k, v)| {
                    let key = k.as_str()?.to_string();
                    let value = serde_json::to_value(v).unwrap_or(Value::Null);
                    Some((key, value))
                })
                .collect();
            (pairs, body)
        }
        Ok(_) => (Vec::new(), body),
        Err(e) => {
            warn!(error = %e, "malformed YAML frontmatter, continuing without it");
            (Vec::new(), body)
        }
    }
}
