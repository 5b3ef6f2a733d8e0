//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Mock RemoteStore for recording calls
//! - Entity table setup on an in-memory database
//! - Row helpers

#![allow(dead_code)]

pub mod mock_remote;

pub use mock_remote::*;

use serde_json::Value;
use sqlx::{Row, SqlitePool};
use sync_reconciler::orchestrator::SyncOrchestrator;
use sync_reconciler::store::SqliteLocalStore;
use sync_reconciler::{Record, SyncConfig};

/// Orchestrator over an in-memory database with `tables` created and
/// configured in that order.
pub async fn orchestrator_with_tables<R: sync_reconciler::RemoteStore>(
    remote: R,
    tables: &[&str],
) -> SyncOrchestrator<SqliteLocalStore, R> {
    let mut config = SyncConfig::for_testing();
    config.settings.tables = tables.iter().map(|t| t.to_string()).collect();
    let orchestrator = SyncOrchestrator::open(&config, remote)
        .await
        .expect("Failed to open orchestrator");
    for table in tables {
        create_entity_table(orchestrator.local().pool(), table).await;
    }
    orchestrator
}

/// Entity table with the columns the tests use.
pub async fn create_entity_table(pool: &SqlitePool, table: &str) {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            description TEXT,
            notes TEXT,
            invoice_number TEXT,
            total_amount REAL,
            amount REAL,
            items TEXT,
            status TEXT,
            sync_status TEXT NOT NULL DEFAULT 'synced',
            _remote_id TEXT,
            last_modified TEXT,
            created_at TEXT
        )
        "#
    ))
    .execute(pool)
    .await
    .expect("Failed to create entity table");
}

/// Insert `row` (a JSON object) and return its id.
pub async fn insert_row(pool: &SqlitePool, table: &str, row: Value) -> i64 {
    let row = record(row);
    let columns: Vec<&str> = row.keys().map(String::as_str).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        vec!["?"; columns.len()].join(", ")
    );
    let mut query = sqlx::query(&sql);
    for value in row.values() {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
            Value::Number(n) => query.bind(n.as_f64()),
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
        .execute(pool)
        .await
        .expect("Failed to insert row")
        .last_insert_rowid()
}

/// `sync_status` of row `id`.
pub async fn sync_status(pool: &SqlitePool, table: &str, id: i64) -> String {
    sqlx::query(&format!("SELECT sync_status FROM {} WHERE id = ?", table))
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("row not found")
        .get("sync_status")
}

/// Single text column of row `id`.
pub async fn text_column(pool: &SqlitePool, table: &str, id: i64, column: &str) -> Option<String> {
    sqlx::query(&format!("SELECT {} FROM {} WHERE id = ?", column, table))
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("row not found")
        .get(column)
}

pub async fn row_count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count failed")
        .get("n")
}

/// JSON object literal to [`Record`].
pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("expected a JSON object")
}
