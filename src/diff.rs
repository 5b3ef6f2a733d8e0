// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Field-level differences between a local row and a remote document.

use crate::compare::optional_values_equal;
use crate::record::{strip_ignored, Record};
use serde::Serialize;
use serde_json::Value;

/// One field whose local and remote values disagree.
///
/// A side that lacks the field carries `Value::Null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub field: String,
    pub local: Value,
    pub remote: Value,
}

/// Ordered set of differing fields: local key order first, then remote-only keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diff(Vec<FieldDiff>);

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDiff> {
        self.0.iter()
    }

    /// Names of the differing fields, in diff order.
    pub fn fields(&self) -> Vec<String> {
        self.0.iter().map(|d| d.field.clone()).collect()
    }

    pub fn get(&self, field: &str) -> Option<&FieldDiff> {
        self.0.iter().find(|d| d.field == field)
    }
}

/// Compute the fields that differ between `local` and `remote`.
///
/// Bookkeeping fields are stripped from both sides first, so the result never
/// names one of them.
pub fn diff(local: &Record, remote: &Record) -> Diff {
    let local = strip_ignored(local);
    let remote = strip_ignored(remote);

    let keys = local
        .keys()
        .chain(remote.keys().filter(|k| !local.contains_key(*k)));

    let entries = keys
        .filter(|k| !optional_values_equal(local.get(*k), remote.get(*k)))
        .map(|k| FieldDiff {
            field: k.clone(),
            local: local.get(k).cloned().unwrap_or(Value::Null),
            remote: remote.get(k).cloned().unwrap_or(Value::Null),
        })
        .collect();

    Diff(entries)
}
