// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable log of critical conflicts awaiting human review.
//!
//! Each detected critical conflict becomes exactly one `PENDING` row holding
//! both snapshots. The only mutation is a manual resolution, which stamps the
//! resolver, the time and the chosen side and flips the row to `RESOLVED`.
//! Rows are never deleted automatically; [`ConflictLog::purge_resolved`] is an
//! explicit housekeeping call and never touches pending rows.
//!
//! Resolving does not write anything back to the entity tables. The caller
//! takes [`ConflictLogEntry::chosen_record`] and re-submits it through its
//! normal write path.

use crate::db::{days_ago, execute_with_retry, is_missing_table_error, now_timestamp, SQL_NOW};
use crate::error::{ReconcileError, Result};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Kind of a logged conflict. Only critical divergence is ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    Critical,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStatus {
    Pending,
    Resolved,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Resolved => "RESOLVED",
        }
    }
}

impl FromStr for ConflictStatus {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RESOLVED" => Ok(Self::Resolved),
            other => Err(ReconcileError::InvalidData(format!("conflict status {:?}", other))),
        }
    }
}

/// Side picked by the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    KeepLocal,
    TakeRemote,
}

impl ResolutionChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::TakeRemote => "take_remote",
        }
    }
}

impl FromStr for ResolutionChoice {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keep_local" => Ok(Self::KeepLocal),
            "take_remote" => Ok(Self::TakeRemote),
            other => Err(ReconcileError::InvalidData(format!("resolution choice {:?}", other))),
        }
    }
}

/// A conflict about to be logged.
#[derive(Debug, Clone)]
pub struct NewConflict {
    pub table_name: String,
    pub entity_id: String,
    pub entity_name: String,
    pub local_data: Record,
    pub remote_data: Record,
    pub kind: ConflictKind,
    /// Critical fields first.
    pub conflicting_fields: Vec<String>,
}

/// One persisted conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictLogEntry {
    pub id: i64,
    pub table_name: String,
    pub entity_id: String,
    pub entity_name: String,
    pub local_data: Record,
    pub remote_data: Record,
    pub kind: ConflictKind,
    pub conflicting_fields: Vec<String>,
    pub status: ConflictStatus,
    pub resolution_choice: Option<ResolutionChoice>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<String>,
    pub created_at: String,
}

impl ConflictLogEntry {
    pub fn is_pending(&self) -> bool {
        self.status == ConflictStatus::Pending
    }

    /// The snapshot matching `choice`, for re-submission by the caller.
    pub fn chosen_record(&self, choice: ResolutionChoice) -> &Record {
        match choice {
            ResolutionChoice::KeepLocal => &self.local_data,
            ResolutionChoice::TakeRemote => &self.remote_data,
        }
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("resolution_status")?;
        let choice: Option<String> = row.try_get("resolution_choice")?;
        let fields: String = row.try_get::<Option<String>, _>("conflicting_fields")?.unwrap_or_default();
        let id: i64 = row.try_get("id")?;

        Ok(Self {
            id,
            table_name: row.try_get("table_name")?,
            entity_id: row.try_get("entity_id")?,
            entity_name: row.try_get::<Option<String>, _>("entity_name")?.unwrap_or_default(),
            local_data: decode_snapshot(id, row.try_get("local_data")?),
            remote_data: decode_snapshot(id, row.try_get("remote_data")?),
            kind: ConflictKind::Critical,
            conflicting_fields: serde_json::from_str(&fields).unwrap_or_default(),
            status: status.parse()?,
            resolution_choice: choice.map(|c| c.parse()).transpose()?,
            resolved_by: row.try_get("resolved_by")?,
            resolved_at: row.try_get("resolved_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn decode_snapshot(id: i64, text: Option<String>) -> Record {
    let Some(text) = text else {
        return Record::new();
    };
    match serde_json::from_str::<Record>(&text) {
        Ok(record) => record,
        Err(e) => {
            warn!(conflict_id = id, error = %e, "Unreadable conflict snapshot");
            Record::new()
        }
    }
}

const SELECT_COLUMNS: &str = "id, table_name, entity_id, entity_name, local_data, remote_data, \
     conflict_type, conflicting_fields, resolution_status, resolution_choice, resolved_by, \
     resolved_at, created_at";

/// SQLite-backed conflict log (`conflict_log` table).
#[derive(Clone)]
pub struct ConflictLog {
    pool: SqlitePool,
}

impl ConflictLog {
    /// Attach to `pool`, creating the table if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let log = Self::attach(pool);
        log.create_schema().await?;
        Ok(log)
    }

    /// Attach without DDL. Reads against a missing table come back empty.
    pub fn attach(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_schema(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS conflict_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                entity_name TEXT,
                local_data TEXT,
                remote_data TEXT,
                conflict_type TEXT,
                conflicting_fields TEXT,
                resolution_status TEXT NOT NULL DEFAULT 'PENDING',
                resolution_choice TEXT,
                resolved_by TEXT,
                resolved_at TEXT,
                created_at TEXT NOT NULL DEFAULT ({})
            )
            "#,
            SQL_NOW
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conflict_log_status \
             ON conflict_log (resolution_status, table_name)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a new PENDING conflict and return its id.
    pub async fn append(&self, conflict: &NewConflict) -> Result<i64> {
        let local = serde_json::to_string(&conflict.local_data)?;
        let remote = serde_json::to_string(&conflict.remote_data)?;
        let fields = serde_json::to_string(&conflict.conflicting_fields)?;
        let created_at = now_timestamp();
        let pool = &self.pool;

        let result = execute_with_retry("conflict_append", || async {
            sqlx::query(
                r#"
                INSERT INTO conflict_log
                    (table_name, entity_id, entity_name, local_data, remote_data,
                     conflict_type, conflicting_fields, resolution_status, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, 'PENDING', ?)
                "#,
            )
            .bind(&conflict.table_name)
            .bind(&conflict.entity_id)
            .bind(&conflict.entity_name)
            .bind(&local)
            .bind(&remote)
            .bind(conflict.kind.as_str())
            .bind(&fields)
            .bind(&created_at)
            .execute(pool)
            .await
        })
        .await?;

        let id = result.last_insert_rowid();
        debug!(
            conflict_id = id,
            table = %conflict.table_name,
            entity_id = %conflict.entity_id,
            "Conflict logged for review"
        );
        Ok(id)
    }

    /// PENDING conflicts, newest first, optionally for one table.
    pub async fn list_pending(&self, table: Option<&str>) -> Result<Vec<ConflictLogEntry>> {
        let sql = match table {
            Some(_) => format!(
                "SELECT {SELECT_COLUMNS} FROM conflict_log \
                 WHERE resolution_status = 'PENDING' AND table_name = ? \
                 ORDER BY created_at DESC, id DESC"
            ),
            None => format!(
                "SELECT {SELECT_COLUMNS} FROM conflict_log \
                 WHERE resolution_status = 'PENDING' \
                 ORDER BY created_at DESC, id DESC"
            ),
        };
        let mut query = sqlx::query(&sql);
        if let Some(table) = table {
            query = query.bind(table);
        }
        self.fetch_entries(query.fetch_all(&self.pool).await)
    }

    pub async fn count_pending(&self) -> Result<u64> {
        let result: std::result::Result<(i64,), sqlx::Error> = sqlx::query_as(
            "SELECT COUNT(*) FROM conflict_log WHERE resolution_status = 'PENDING'",
        )
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok((count,)) => Ok(count.max(0) as u64),
            Err(e) if is_missing_table_error(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark a PENDING conflict RESOLVED. Returns false when `id` does not
    /// name a PENDING conflict.
    pub async fn resolve(&self, id: i64, choice: ResolutionChoice, resolved_by: &str) -> Result<bool> {
        let resolved_at = now_timestamp();
        let pool = &self.pool;

        let result = execute_with_retry("conflict_resolve", || async {
            sqlx::query(
                r#"
                UPDATE conflict_log
                SET resolution_status = 'RESOLVED',
                    resolution_choice = ?,
                    resolved_by = ?,
                    resolved_at = ?
                WHERE id = ? AND resolution_status = 'PENDING'
                "#,
            )
            .bind(choice.as_str())
            .bind(resolved_by)
            .bind(&resolved_at)
            .bind(id)
            .execute(pool)
            .await
        })
        .await;

        let resolved = match result {
            Ok(done) => done.rows_affected() > 0,
            Err(e) if is_missing_table_error(&e) => false,
            Err(e) => return Err(e.into()),
        };

        if resolved {
            info!(conflict_id = id, choice = choice.as_str(), resolved_by, "Conflict resolved");
            crate::metrics::record_conflict_resolved(choice.as_str());
        }
        Ok(resolved)
    }

    /// All conflicts regardless of status, newest first.
    pub async fn history(&self, limit: u32) -> Result<Vec<ConflictLogEntry>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM conflict_log ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql).bind(i64::from(limit)).fetch_all(&self.pool).await;
        self.fetch_entries(rows)
    }

    pub async fn get(&self, id: i64) -> Result<Option<ConflictLogEntry>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM conflict_log WHERE id = ?");
        match sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await {
            Ok(Some(row)) => Ok(Some(ConflictLogEntry::from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) if is_missing_table_error(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete RESOLVED conflicts resolved more than `older_than_days` ago.
    pub async fn purge_resolved(&self, older_than_days: u32) -> Result<u64> {
        let cutoff = days_ago(older_than_days);
        let pool = &self.pool;
        let result = execute_with_retry("conflict_purge", || async {
            sqlx::query(
                "DELETE FROM conflict_log \
                 WHERE resolution_status = 'RESOLVED' AND resolved_at < ?",
            )
            .bind(&cutoff)
            .execute(pool)
            .await
        })
        .await;

        match result {
            Ok(done) => {
                let removed = done.rows_affected();
                if removed > 0 {
                    info!(removed, older_than_days, "Purged resolved conflicts");
                }
                Ok(removed)
            }
            Err(e) if is_missing_table_error(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch_entries(
        &self,
        rows: std::result::Result<Vec<SqliteRow>, sqlx::Error>,
    ) -> Result<Vec<ConflictLogEntry>> {
        match rows {
            Ok(rows) => rows.iter().map(ConflictLogEntry::from_row).collect(),
            Err(e) if is_missing_table_error(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}
