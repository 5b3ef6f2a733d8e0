// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! [`LocalStore`] over plain SQLite entity tables.
//!
//! Table and column names come from configuration and from the records
//! themselves, so every identifier is validated and quoted before it reaches
//! SQL; values are always bound. Record fields with no matching column are
//! dropped on write.
//!
//! SQLite storage classes map onto JSON values as:
//!
//! | storage | value |
//! |---------|-------|
//! | NULL | null |
//! | INTEGER | number (i64) |
//! | REAL | number (f64) |
//! | TEXT | string |
//! | BLOB | string (lossy UTF-8) |

use super::{BoxFuture, LocalStore, LocalWrite};
use crate::db::{execute_with_retry, now_timestamp, quote_identifier, table_exists};
use crate::error::Result;
use crate::record::{
    Record, RowSyncStatus, LAST_MODIFIED_FIELD, LOCAL_ID_FIELD, REMOTE_ALIAS_FIELD, SYNC_STATUS_FIELD,
};
use serde_json::{Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::collections::HashSet;
use tracing::debug;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Local entity tables in a SQLite database.
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for hosts that write entity rows directly.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn columns(&self, table: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_identifier(table)?))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(Into::into))
            .collect()
    }

    async fn dirty_rows_impl(&self, table: &str) -> Result<Vec<Record>> {
        if !table_exists(&self.pool, table).await? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM {} WHERE {} IN (?, ?)",
            quote_identifier(table)?,
            quote_identifier(SYNC_STATUS_FIELD)?
        );
        let mut query = sqlx::query(&sql);
        for status in RowSyncStatus::DIRTY {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn find_by(&self, table: &str, column: &str, key: &str) -> Result<Option<Record>> {
        if !table_exists(&self.pool, table).await? {
            return Ok(None);
        }
        if !self.columns(table).await?.contains(column) {
            return Ok(None);
        }
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ? LIMIT 1",
            quote_identifier(table)?,
            quote_identifier(column)?
        );
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn mark_synced_impl(&self, table: &str, id: Value, remote_key: Option<String>) -> Result<bool> {
        let columns = self.columns(table).await?;
        let mut assignments = vec![format!("{} = ?", quote_identifier(SYNC_STATUS_FIELD)?)];
        let mut values = vec![Value::String(RowSyncStatus::Synced.as_str().to_string())];

        if let Some(key) = remote_key {
            if columns.contains(REMOTE_ALIAS_FIELD) {
                assignments.push(format!("{} = ?", quote_identifier(REMOTE_ALIAS_FIELD)?));
                values.push(Value::String(key));
            }
        }
        if columns.contains(LAST_MODIFIED_FIELD) {
            assignments.push(format!("{} = ?", quote_identifier(LAST_MODIFIED_FIELD)?));
            values.push(Value::String(now_timestamp()));
        }
        values.push(id);

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_identifier(table)?,
            assignments.join(", "),
            quote_identifier(LOCAL_ID_FIELD)?
        );
        let pool = &self.pool;
        let done = execute_with_retry("local_mark_synced", || {
            let query = values.iter().fold(sqlx::query(&sql), bind_value);
            async move { query.execute(pool).await }
        })
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn apply_pull_batch_impl(&self, table: &str, writes: Vec<LocalWrite>) -> Result<usize> {
        if writes.is_empty() {
            return Ok(0);
        }
        let columns = self.columns(table).await?;
        let quoted_table = quote_identifier(table)?;
        let stamp = now_timestamp();

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for write in writes {
            let (id, record) = match write {
                LocalWrite::Insert(record) => (None, record),
                LocalWrite::Update { id, record } => (Some(id), record),
            };

            let mut fields: Vec<(String, Value)> = record
                .into_iter()
                .filter(|(field, _)| {
                    columns.contains(field)
                        && field != LOCAL_ID_FIELD
                        && field != SYNC_STATUS_FIELD
                        && field != LAST_MODIFIED_FIELD
                })
                .collect();
            if columns.contains(SYNC_STATUS_FIELD) {
                fields.push((
                    SYNC_STATUS_FIELD.to_string(),
                    Value::String(RowSyncStatus::Synced.as_str().to_string()),
                ));
            }
            if columns.contains(LAST_MODIFIED_FIELD) {
                fields.push((LAST_MODIFIED_FIELD.to_string(), Value::String(stamp.clone())));
            }

            let names = fields
                .iter()
                .map(|(field, _)| quote_identifier(field))
                .collect::<Result<Vec<_>>>()?;
            let mut values: Vec<Value> = fields.into_iter().map(|(_, value)| value).collect();

            let sql = match id {
                None if names.is_empty() => format!("INSERT INTO {} DEFAULT VALUES", quoted_table),
                None => format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quoted_table,
                    names.join(", "),
                    vec!["?"; names.len()].join(", ")
                ),
                Some(_) if names.is_empty() => continue,
                Some(id) => {
                    values.push(id);
                    format!(
                        "UPDATE {} SET {} WHERE {} = ?",
                        quoted_table,
                        names.iter().map(|n| format!("{} = ?", n)).collect::<Vec<_>>().join(", "),
                        quote_identifier(LOCAL_ID_FIELD)?
                    )
                }
            };

            let query = values.iter().fold(sqlx::query(&sql), bind_value);
            written += query.execute(&mut *tx).await?.rows_affected() as usize;
        }
        tx.commit().await?;

        debug!(table, written, "Applied pulled rows");
        Ok(written)
    }

    async fn pending_count_impl(&self, table: &str) -> Result<u64> {
        if !table_exists(&self.pool, table).await? {
            return Ok(0);
        }
        if !self.columns(table).await?.contains(SYNC_STATUS_FIELD) {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} IN (?, ?)",
            quote_identifier(table)?,
            quote_identifier(SYNC_STATUS_FIELD)?
        );
        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        for status in RowSyncStatus::DIRTY {
            query = query.bind(status.as_str());
        }
        let (count,) = query.fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

impl LocalStore for SqliteLocalStore {
    fn table_exists(&self, table: &str) -> BoxFuture<'_, Result<bool>> {
        let table = table.to_string();
        Box::pin(async move { table_exists(&self.pool, &table).await })
    }

    fn dirty_rows(&self, table: &str) -> BoxFuture<'_, Result<Vec<Record>>> {
        let table = table.to_string();
        Box::pin(async move { self.dirty_rows_impl(&table).await })
    }

    fn find(&self, table: &str, id: &str) -> BoxFuture<'_, Result<Option<Record>>> {
        let table = table.to_string();
        let id = id.to_string();
        Box::pin(async move { self.find_by(&table, LOCAL_ID_FIELD, &id).await })
    }

    fn find_by_remote_id(&self, table: &str, key: &str) -> BoxFuture<'_, Result<Option<Record>>> {
        let table = table.to_string();
        let key = key.to_string();
        Box::pin(async move { self.find_by(&table, REMOTE_ALIAS_FIELD, &key).await })
    }

    fn mark_synced(&self, table: &str, id: Value, remote_key: Option<String>) -> BoxFuture<'_, Result<bool>> {
        let table = table.to_string();
        Box::pin(async move { self.mark_synced_impl(&table, id, remote_key).await })
    }

    fn apply_pull_batch(&self, table: &str, writes: Vec<LocalWrite>) -> BoxFuture<'_, Result<usize>> {
        let table = table.to_string();
        Box::pin(async move { self.apply_pull_batch_impl(&table, writes).await })
    }

    fn pending_count(&self, table: &str) -> BoxFuture<'_, Result<u64>> {
        let table = table.to_string();
        Box::pin(async move { self.pending_count_impl(&table).await })
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        nested => query.bind(nested.to_string()),
    }
}

fn row_to_record(row: &SqliteRow) -> Result<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(index)?),
                "REAL" => Number::from_f64(row.try_get::<f64, _>(index)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    Value::String(String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(index)?).into_owned())
                }
                _ => Value::String(row.try_get::<String, _>(index)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::open_pool;
    use serde_json::json;

    async fn store() -> SqliteLocalStore {
        let pool = open_pool(&DatabaseConfig::in_memory()).await.unwrap();
        sqlx::query(
            "CREATE TABLE clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                balance REAL,
                tags TEXT,
                sync_status TEXT DEFAULT 'new_offline',
                _remote_id TEXT,
                last_modified TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        SqliteLocalStore::new(pool)
    }

    async fn insert(store: &SqliteLocalStore, name: &str, status: &str, remote: Option<&str>) -> i64 {
        sqlx::query("INSERT INTO clients (name, balance, sync_status, _remote_id) VALUES (?, 1.5, ?, ?)")
            .bind(name)
            .bind(status)
            .bind(remote)
            .execute(store.pool())
            .await
            .unwrap()
            .last_insert_rowid()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_dirty_rows_and_pending_count() {
        let s = store().await;
        insert(&s, "a", "new_offline", None).await;
        insert(&s, "b", "modified_offline", Some("r-b")).await;
        insert(&s, "c", "synced", Some("r-c")).await;

        let dirty = s.dirty_rows("clients").await.unwrap();
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty[0]["balance"], json!(1.5));
        assert!(dirty[0]["id"].is_i64());
        assert_eq!(dirty[0]["_remote_id"], Value::Null);
        assert_eq!(s.pending_count("clients").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_table_is_empty() {
        let s = store().await;
        assert!(!s.table_exists("invoices").await.unwrap());
        assert!(s.dirty_rows("invoices").await.unwrap().is_empty());
        assert_eq!(s.pending_count("invoices").await.unwrap(), 0);
        assert!(s.find("invoices", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_id_and_remote_key() {
        let s = store().await;
        let id = insert(&s, "a", "synced", Some("r-a")).await;

        let by_id = s.find("clients", &id.to_string()).await.unwrap().unwrap();
        assert_eq!(by_id["name"], json!("a"));
        let by_key = s.find_by_remote_id("clients", "r-a").await.unwrap().unwrap();
        assert_eq!(by_key["id"], json!(id));
        assert!(s.find_by_remote_id("clients", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_synced_records_key() {
        let s = store().await;
        let id = insert(&s, "a", "new_offline", None).await;

        assert!(s.mark_synced("clients", json!(id), Some("r-new".to_string())).await.unwrap());
        let row = s.find("clients", &id.to_string()).await.unwrap().unwrap();
        assert_eq!(row["sync_status"], json!("synced"));
        assert_eq!(row["_remote_id"], json!("r-new"));
        assert!(row["last_modified"].is_string());

        assert!(!s.mark_synced("clients", json!(9999), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_pull_batch() {
        let s = store().await;
        let id = insert(&s, "old", "synced", Some("r-1")).await;

        let writes = vec![
            LocalWrite::Insert(record(json!({
                "_remote_id": "r-2", "name": "fresh", "tags": "[\"vip\"]", "unknown_col": 1
            }))),
            LocalWrite::Update {
                id: json!(id),
                record: record(json!({"_remote_id": "r-1", "name": "renamed", "balance": 3})),
            },
        ];
        assert_eq!(s.apply_pull_batch("clients", writes).await.unwrap(), 2);

        let fresh = s.find_by_remote_id("clients", "r-2").await.unwrap().unwrap();
        assert_eq!(fresh["name"], json!("fresh"));
        assert_eq!(fresh["tags"], json!("[\"vip\"]"));
        assert_eq!(fresh["sync_status"], json!("synced"));

        let renamed = s.find("clients", &id.to_string()).await.unwrap().unwrap();
        assert_eq!(renamed["name"], json!("renamed"));
        assert_eq!(renamed["balance"], json!(3.0));
        assert_eq!(s.pending_count("clients").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_apply_pull_batch_rolls_back_on_error() {
        let s = store().await;
        sqlx::query("CREATE UNIQUE INDEX uniq_remote ON clients (_remote_id)")
            .execute(s.pool())
            .await
            .unwrap();

        let writes = vec![
            LocalWrite::Insert(record(json!({"_remote_id": "dup", "name": "one"}))),
            LocalWrite::Insert(record(json!({"_remote_id": "dup", "name": "two"}))),
        ];
        assert!(s.apply_pull_batch("clients", writes).await.is_err());
        assert!(s.find_by_remote_id("clients", "dup").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_bad_table_name() {
        let s = store().await;
        assert!(s.dirty_rows("clients; DROP TABLE clients").await.unwrap().is_empty());
        assert!(s.table_exists("clients").await.unwrap());
        assert!(s.mark_synced("clients\"", json!(1), None).await.is_err());
    }
}
