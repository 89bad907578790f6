//! Tool implementations. One file per integration.

pub mod github;
pub mod kubernetes;

use serde_json::Value;

/// First non-blank string among `keys`.
fn str_arg(args: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| args.get(*k))
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer argument, also accepted as a numeric string.
fn int_arg(args: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().filter_map(|k| args.get(*k)).find_map(|v| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

/// True when `value` can stand as one URL path segment without escaping it
/// or walking to another endpoint.
fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
}
