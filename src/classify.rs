// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Critical-field registry and diff classification.
//!
//! A critical field is one whose divergence can never be merged silently:
//! amounts, line items, dates, identifiers that appear on printed documents.
//! The registry is plain configuration data keyed by table name. Tables it
//! does not know have no critical fields, so everything there auto-merges.

use std::collections::BTreeMap;

/// Built-in critical fields per table.
pub const DEFAULT_CRITICAL_FIELDS: &[(&str, &[&str])] = &[
    ("projects", &["total_amount", "items", "status", "milestones", "subtotal"]),
    ("invoices", &["total_amount", "items", "tax_amount", "invoice_number", "subtotal"]),
    ("payments", &["amount", "payment_method", "date"]),
    ("expenses", &["amount", "category", "date"]),
    ("journal_entries", &["lines", "date"]),
    ("accounts", &["balance", "code"]),
    ("quotations", &["total_amount", "items", "subtotal"]),
];

/// Per-table critical field sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalFields {
    tables: BTreeMap<String, Vec<String>>,
}

impl Default for CriticalFields {
    fn default() -> Self {
        let tables = DEFAULT_CRITICAL_FIELDS
            .iter()
            .map(|(table, fields)| {
                (table.to_string(), fields.iter().map(|f| f.to_string()).collect())
            })
            .collect();
        Self { tables }
    }
}

impl CriticalFields {
    /// A registry with no critical fields at all.
    pub fn empty() -> Self {
        Self { tables: BTreeMap::new() }
    }

    /// Defaults with `overrides` applied. A table named in `overrides`
    /// replaces its default set; other defaults are kept.
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<String>>) -> Self {
        let mut registry = Self::default();
        for (table, fields) in overrides {
            registry.set(table.clone(), fields.clone());
        }
        registry
    }

    pub fn set(&mut self, table: impl Into<String>, fields: Vec<String>) {
        self.tables.insert(table.into(), fields);
    }

    /// Critical fields of `table`; empty for unknown tables.
    pub fn for_table(&self, table: &str) -> &[String] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_critical(&self, table: &str, field: &str) -> bool {
        self.for_table(table).iter().any(|f| f == field)
    }

    /// Split `fields` into (critical, non-critical), preserving order within each.
    pub fn classify(&self, table: &str, fields: &[String]) -> (Vec<String>, Vec<String>) {
        fields
            .iter()
            .cloned()
            .partition(|field| self.is_critical(table, field))
    }
}
