// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Field-level merge for non-critical divergence.
//!
//! The merge starts from the remote document and only pulls individual
//! fields from the local row:
//!
//! | remote | local | result |
//! |--------|-------|--------|
//! | falsy / missing | truthy | local |
//! | text | text | strictly longer by character count, ties keep remote |
//! | otherwise | | remote |

use crate::record::{is_falsy, Record};
use serde_json::Value;

/// Merge the differing `fields` of `local` into a copy of `remote`.
pub fn merge(local: &Record, remote: &Record, fields: &[String]) -> Record {
    let mut merged = remote.clone();
    for field in fields {
        let local_value = local.get(field).unwrap_or(&Value::Null);
        let remote_value = remote.get(field).unwrap_or(&Value::Null);
        if prefer_local(local_value, remote_value) {
            merged.insert(field.clone(), local_value.clone());
        }
    }
    merged
}

fn prefer_local(local: &Value, remote: &Value) -> bool {
    if is_falsy(remote) {
        return !is_falsy(local);
    }
    match (local, remote) {
        (Value::String(l), Value::String(r)) => l.chars().count() > r.chars().count(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn fields(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_longer_text_wins_and_remote_kept() {
        let local = record(json!({"notes": "long detailed note", "description": ""}));
        let remote = record(json!({"notes": "short", "description": "cloud desc"}));
        let merged = merge(&local, &remote, &fields(&["notes", "description"]));
        assert_eq!(merged["notes"], json!("long detailed note"));
        assert_eq!(merged["description"], json!("cloud desc"));
    }

    #[test]
    fn test_falsy_remote_takes_local() {
        let local = record(json!({"phone": "555", "tags": ["a"], "qty": 3}));
        let remote = record(json!({"phone": null, "tags": [], "qty": 0}));
        let merged = merge(&local, &remote, &fields(&["phone", "tags", "qty"]));
        assert_eq!(merged["phone"], json!("555"));
        assert_eq!(merged["tags"], json!(["a"]));
        assert_eq!(merged["qty"], json!(3));
    }

    #[test]
    fn test_missing_remote_field_takes_local() {
        let local = record(json!({"email": "a@b.c"}));
        let remote = record(json!({"name": "X"}));
        let merged = merge(&local, &remote, &fields(&["email"]));
        assert_eq!(merged["email"], json!("a@b.c"));
        assert_eq!(merged["name"], json!("X"));
    }

    #[test]
    fn test_equal_length_text_keeps_remote() {
        let local = record(json!({"code": "AAAA"}));
        let remote = record(json!({"code": "BBBB"}));
        assert_eq!(merge(&local, &remote, &fields(&["code"]))["code"], json!("BBBB"));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let local = record(json!({"city": "Zürich"}));
        let remote = record(json!({"city": "Zurich"}));
        assert_eq!(merge(&local, &remote, &fields(&["city"]))["city"], json!("Zurich"));
    }

    #[test]
    fn test_non_text_keeps_remote() {
        let local = record(json!({"rate": 12}));
        let remote = record(json!({"rate": 10}));
        assert_eq!(merge(&local, &remote, &fields(&["rate"]))["rate"], json!(10));
    }

    #[test]
    fn test_inputs_untouched() {
        let local = record(json!({"a": "longer"}));
        let remote = record(json!({"a": "x"}));
        let before = (local.clone(), remote.clone());
        let _ = merge(&local, &remote, &fields(&["a"]));
        assert_eq!((local, remote), before);
    }
}
