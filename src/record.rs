// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Records and the bookkeeping fields that travel with them.
//!
//! A [`Record`] is one business entity instance: an ordered, string-keyed map
//! over JSON values. The core never interprets a record beyond the fixed
//! bookkeeping fields listed here.
//!
//! # Row Preparation
//!
//! Local rows and remote documents use different bookkeeping:
//!
//! ```text
//! local row                              remote document
//! ─────────                              ───────────────
//! id            (local primary key)      (dropped)
//! _remote_id    (remote key alias)  ◄──► _id
//! sync_status   (new_offline, ...)       (dropped)
//! items  '[{"sku":"A"}]'  (JSON text) ◄──► items  [{"sku":"A"}]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// One business entity instance.
pub type Record = Map<String, Value>;

/// Local primary key column.
pub const LOCAL_ID_FIELD: &str = "id";

/// Remote document key.
pub const REMOTE_ID_FIELD: &str = "_id";

/// Local column holding the remote document key.
pub const REMOTE_ALIAS_FIELD: &str = "_remote_id";

/// Local column holding the row's [`RowSyncStatus`].
pub const SYNC_STATUS_FIELD: &str = "sync_status";

/// Local column stamped whenever the engine writes a row.
pub const LAST_MODIFIED_FIELD: &str = "last_modified";

/// Bookkeeping fields excluded from every comparison.
pub const IGNORED_FIELDS: &[&str] = &[
    LOCAL_ID_FIELD,
    REMOTE_ID_FIELD,
    REMOTE_ALIAS_FIELD,
    SYNC_STATUS_FIELD,
    "created_at",
    "updated_at",
    LAST_MODIFIED_FIELD,
];

/// Whether `field` is bookkeeping rather than business data.
pub fn is_ignored(field: &str) -> bool {
    IGNORED_FIELDS.contains(&field)
}

/// Copy of `record` without bookkeeping fields.
pub fn strip_ignored(record: &Record) -> Record {
    record
        .iter()
        .filter(|(k, _)| !is_ignored(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Falsy values: null, `false`, zero, empty string, empty list, empty map.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Render a scalar as an identifier string (`"INV-1"`, `42`).
///
/// Falsy values yield `None`.
pub fn as_key(value: &Value) -> Option<String> {
    if is_falsy(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Best-effort identifier for a record: `id`, else `invoice_number`, else `name`.
pub fn entity_id(record: &Record) -> String {
    [LOCAL_ID_FIELD, "invoice_number", "name"]
        .iter()
        .find_map(|field| record.get(*field).and_then(as_key))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Best-effort display name for a record: `name`, else `description`.
pub fn entity_name(record: &Record) -> String {
    ["name", "description"]
        .iter()
        .find_map(|field| record.get(*field).and_then(as_key))
        .unwrap_or_default()
}

/// Remote key carried by a document (`_id`), if any.
pub fn remote_key(document: &Record) -> Option<String> {
    document.get(REMOTE_ID_FIELD).and_then(as_key)
}

/// Convert a remote document into the shape stored locally.
///
/// Drops `_id`/`id`, records the key under `_remote_id` and flattens nested
/// lists/maps into JSON text.
pub fn prepare_for_local(document: &Record) -> Record {
    let mut local = Record::new();
    for (field, value) in document {
        if field == REMOTE_ID_FIELD || field == LOCAL_ID_FIELD {
            continue;
        }
        let value = match value {
            Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
            other => other.clone(),
        };
        local.insert(field.clone(), value);
    }
    if let Some(key) = remote_key(document) {
        local.insert(REMOTE_ALIAS_FIELD.to_string(), Value::String(key));
    }
    local
}

/// Convert a local row into the document sent to the remote store.
///
/// Drops local bookkeeping, expands JSON text holding lists/maps, and carries
/// the known remote key as `_id`.
pub fn prepare_for_remote(row: &Record) -> Record {
    let mut document = Record::new();
    if let Some(key) = row.get(REMOTE_ALIAS_FIELD).and_then(as_key) {
        document.insert(REMOTE_ID_FIELD.to_string(), Value::String(key));
    }
    for (field, value) in row {
        if field == LOCAL_ID_FIELD || field == REMOTE_ALIAS_FIELD || field == SYNC_STATUS_FIELD {
            continue;
        }
        document.insert(field.clone(), expand_json_text(value));
    }
    document
}

fn expand_json_text(value: &Value) -> Value {
    if let Value::String(s) = value {
        let trimmed = s.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(parsed @ (Value::Array(_) | Value::Object(_))) =
                serde_json::from_str::<Value>(s)
            {
                return parsed;
            }
        }
    }
    value.clone()
}

/// Sync state of a local entity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSyncStatus {
    /// Created locally, never transmitted.
    NewOffline,
    /// Edited locally since the last transmission.
    ModifiedOffline,
    /// Matches what the remote store holds.
    Synced,
    /// Handed to the queue, awaiting transmission.
    PendingSync,
    /// Frozen by a pending critical conflict.
    Conflict,
}

impl RowSyncStatus {
    /// Statuses that make a row dirty (to be pushed).
    pub const DIRTY: [RowSyncStatus; 2] = [RowSyncStatus::NewOffline, RowSyncStatus::ModifiedOffline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewOffline => "new_offline",
            Self::ModifiedOffline => "modified_offline",
            Self::Synced => "synced",
            Self::PendingSync => "pending_sync",
            Self::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for RowSyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowSyncStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new_offline" => Ok(Self::NewOffline),
            "modified_offline" => Ok(Self::ModifiedOffline),
            "synced" => Ok(Self::Synced),
            "pending_sync" => Ok(Self::PendingSync),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_strip_ignored_removes_bookkeeping() {
        let r = record(json!({
            "id": 7, "_id": "abc", "_remote_id": "abc", "sync_status": "synced",
            "created_at": "x", "updated_at": "y", "last_modified": "z", "name": "Acme"
        }));
        let stripped = strip_ignored(&r);
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped["name"], json!("Acme"));
    }

    #[test]
    fn test_is_falsy() {
        for v in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(is_falsy(&v), "{v} should be falsy");
        }
        for v in [json!(true), json!(1), json!(-0.5), json!("a"), json!([0]), json!({"a": null})] {
            assert!(!is_falsy(&v), "{v} should be truthy");
        }
    }

    #[test]
    fn test_entity_id_fallbacks() {
        assert_eq!(entity_id(&record(json!({"id": "INV-100", "name": "x"}))), "INV-100");
        assert_eq!(entity_id(&record(json!({"id": 42}))), "42");
        assert_eq!(entity_id(&record(json!({"id": null, "invoice_number": "N-9"}))), "N-9");
        assert_eq!(entity_id(&record(json!({"name": "Acme"}))), "Acme");
        assert_eq!(entity_id(&record(json!({"total": 3}))), "unknown");
    }

    #[test]
    fn test_entity_name_fallbacks() {
        assert_eq!(entity_name(&record(json!({"name": "Acme", "description": "d"}))), "Acme");
        assert_eq!(entity_name(&record(json!({"name": "", "description": "d"}))), "d");
        assert_eq!(entity_name(&record(json!({"id": 1}))), "");
    }

    #[test]
    fn test_prepare_for_local() {
        let doc = record(json!({
            "_id": "r-1", "id": 99, "name": "Acme", "items": [{"sku": "A"}], "meta": {"k": 1}
        }));
        let local = prepare_for_local(&doc);
        assert!(!local.contains_key("_id"));
        assert!(!local.contains_key("id"));
        assert_eq!(local["_remote_id"], json!("r-1"));
        assert_eq!(local["items"], json!(r#"[{"sku":"A"}]"#));
        assert_eq!(local["meta"], json!(r#"{"k":1}"#));
    }

    #[test]
    fn test_prepare_for_remote() {
        let row = record(json!({
            "id": 3, "_remote_id": "r-3", "sync_status": "modified_offline",
            "name": "Acme", "items": "[1,2]", "note": "[not json"
        }));
        let doc = prepare_for_remote(&row);
        assert_eq!(doc["_id"], json!("r-3"));
        assert!(!doc.contains_key("id"));
        assert!(!doc.contains_key("sync_status"));
        assert!(!doc.contains_key("_remote_id"));
        assert_eq!(doc["items"], json!([1, 2]));
        assert_eq!(doc["note"], json!("[not json"));
    }

    #[test]
    fn test_prepare_for_remote_without_key() {
        let row = record(json!({"id": 1, "_remote_id": null, "name": "new"}));
        let doc = prepare_for_remote(&row);
        assert!(!doc.contains_key("_id"));
        assert_eq!(doc["name"], json!("new"));
    }

    #[test]
    fn test_row_sync_status_roundtrip_str() {
        for status in [
            RowSyncStatus::NewOffline,
            RowSyncStatus::ModifiedOffline,
            RowSyncStatus::Synced,
            RowSyncStatus::PendingSync,
            RowSyncStatus::Conflict,
        ] {
            assert_eq!(status.as_str().parse::<RowSyncStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<RowSyncStatus>().is_err());
    }
}
