// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable priority queue of outbound entity operations.
//!
//! # Entry Lifecycle
//!
//! ```text
//!            mark_completed
//! pending ─────────────────► completed ──(retention)──► purged
//!    │
//!    │ mark_failed (retry_count + 1)
//!    ▼
//! pending  ... until retry_count reaches max_retries ... ──► failed (kept)
//!
//! pending ──mark_abandoned (error no retry can fix)──► failed (kept)
//! ```
//!
//! # Ordering
//!
//! [`SyncQueue::drain`] returns pending entries by priority tier
//! (high > medium > low), FIFO within a tier by creation time, with the row
//! id breaking ties between entries created in the same millisecond.
//!
//! All reads tolerate a missing `sync_queue` table and return empty/zero.

use crate::db::{days_ago, execute_with_retry, is_missing_table_error, now_timestamp, SQL_NOW};
use crate::error::{ReconcileError, Result};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, warn};

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ReconcileError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ReconcileError::InvalidData(format!(
                        concat!(stringify!($name), " {:?}"),
                        other
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOperation {
    Create,
    Update,
    Delete,
}

text_enum!(QueueOperation { Create => "create", Update => "update", Delete => "delete" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePriority {
    High,
    #[default]
    Medium,
    Low,
}

text_enum!(QueuePriority { High => "high", Medium => "medium", Low => "low" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Completed,
    Failed,
}

text_enum!(QueueStatus { Pending => "pending", Completed => "completed", Failed => "failed" });

/// One persisted queue entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: QueueOperation,
    pub priority: QueuePriority,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub payload: Option<Record>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub last_attempt: Option<String>,
}

impl QueueEntry {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let id: i64 = row.try_get("id")?;
        let operation: String = row.try_get("operation")?;
        let priority: String = row.try_get("priority")?;
        let status: String = row.try_get("status")?;
        let data: Option<String> = row.try_get("data")?;
        let retry_count: i64 = row.try_get("retry_count")?;
        let max_retries: i64 = row.try_get("max_retries")?;

        let payload = match data {
            Some(text) if !text.is_empty() => match serde_json::from_str::<Record>(&text) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(queue_id = id, error = %e, "Unreadable queue payload, ignoring it");
                    None
                }
            },
            _ => None,
        };

        Ok(Self {
            id,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            operation: operation.parse()?,
            priority: priority.parse().unwrap_or_default(),
            status: status.parse()?,
            retry_count: retry_count.max(0) as u32,
            max_retries: max_retries.max(0) as u32,
            payload,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            last_attempt: row.try_get("last_attempt")?,
        })
    }
}

/// Entry counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

/// SQLite-backed outbound queue (`sync_queue` table).
#[derive(Clone)]
pub struct SyncQueue {
    pool: SqlitePool,
    max_retries: u32,
}

impl SyncQueue {
    /// Attach to `pool`, creating the table if needed.
    pub async fn new(pool: SqlitePool, max_retries: u32) -> Result<Self> {
        let queue = Self::attach(pool, max_retries);
        queue.create_schema().await?;
        Ok(queue)
    }

    /// Attach without DDL. Reads against a missing table come back empty.
    pub fn attach(pool: SqlitePool, max_retries: u32) -> Self {
        Self { pool, max_retries }
    }

    pub async fn create_schema(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS sync_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                priority TEXT NOT NULL DEFAULT 'medium',
                status TEXT NOT NULL DEFAULT 'pending',
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                data TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL DEFAULT ({}),
                last_attempt TEXT
            )
            "#,
            SQL_NOW
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue (status, priority, created_at)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Add an operation to the queue and return its id.
    pub async fn enqueue(
        &self,
        entity_type: &str,
        entity_id: &str,
        operation: QueueOperation,
        payload: Option<&Record>,
        priority: QueuePriority,
    ) -> Result<i64> {
        let data = payload.map(serde_json::to_string).transpose()?;
        let created_at = now_timestamp();
        let max_retries = i64::from(self.max_retries);
        let pool = &self.pool;

        let result = execute_with_retry("queue_enqueue", || async {
            sqlx::query(
                r#"
                INSERT INTO sync_queue
                    (entity_type, entity_id, operation, priority, status, retry_count,
                     max_retries, data, created_at)
                VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?)
                "#,
            )
            .bind(entity_type)
            .bind(entity_id)
            .bind(operation.as_str())
            .bind(priority.as_str())
            .bind(max_retries)
            .bind(&data)
            .bind(&created_at)
            .execute(pool)
            .await
        })
        .await?;

        let id = result.last_insert_rowid();
        info!(
            queue_id = id,
            entity_type,
            entity_id,
            operation = operation.as_str(),
            priority = priority.as_str(),
            "Queued sync operation"
        );
        crate::metrics::record_enqueued(entity_type, priority.as_str());
        Ok(id)
    }

    /// Pending entries with retry budget left, in processing order.
    pub async fn drain(&self, limit: u32) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM sync_queue
            WHERE status = 'pending' AND retry_count < max_retries
            ORDER BY
                CASE priority
                    WHEN 'high' THEN 1
                    WHEN 'medium' THEN 2
                    ELSE 3
                END,
                created_at ASC,
                id ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows.iter().map(QueueEntry::from_row).collect(),
            Err(e) if is_missing_table_error(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn mark_completed(&self, id: i64) -> Result<()> {
        let now = now_timestamp();
        let pool = &self.pool;
        execute_with_retry("queue_complete", || async {
            sqlx::query("UPDATE sync_queue SET status = 'completed', last_attempt = ?, error_message = NULL WHERE id = ?")
                .bind(&now)
                .bind(id)
                .execute(pool)
                .await
        })
        .await?;
        debug!(queue_id = id, "Queue entry completed");
        Ok(())
    }

    /// Record a failed attempt. The entry becomes terminally `failed` once
    /// its retry budget is spent.
    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let now = now_timestamp();
        let pool = &self.pool;
        execute_with_retry("queue_fail", || async {
            sqlx::query(
                r#"
                UPDATE sync_queue
                SET retry_count = retry_count + 1,
                    last_attempt = ?,
                    error_message = ?,
                    status = CASE
                        WHEN retry_count + 1 >= max_retries THEN 'failed'
                        ELSE status
                    END
                WHERE id = ?
                "#,
            )
            .bind(&now)
            .bind(error)
            .bind(id)
            .execute(pool)
            .await
        })
        .await?;
        debug!(queue_id = id, error, "Queue entry attempt failed");
        Ok(())
    }

    /// Record a failed attempt that no retry can fix. The entry becomes
    /// `failed` immediately, whatever budget it had left.
    pub async fn mark_abandoned(&self, id: i64, error: &str) -> Result<()> {
        let now = now_timestamp();
        let pool = &self.pool;
        execute_with_retry("queue_abandon", || async {
            sqlx::query(
                r#"
                UPDATE sync_queue
                SET retry_count = retry_count + 1,
                    last_attempt = ?,
                    error_message = ?,
                    status = 'failed'
                WHERE id = ?
                "#,
            )
            .bind(&now)
            .bind(error)
            .bind(id)
            .execute(pool)
            .await
        })
        .await?;
        debug!(queue_id = id, error, "Queue entry abandoned");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<QueueEntry>> {
        match sqlx::query("SELECT * FROM sync_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(row)) => Ok(Some(QueueEntry::from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) if is_missing_table_error(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn status_counts(&self) -> Result<QueueCounts> {
        let rows: std::result::Result<Vec<(String, i64)>, sqlx::Error> =
            sqlx::query_as("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) if is_missing_table_error(&e) => return Ok(QueueCounts::default()),
            Err(e) => return Err(e.into()),
        };

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status.as_str() {
                "pending" => counts.pending = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                _ => {}
            }
            counts.total += count;
        }
        Ok(counts)
    }

    /// Delete completed entries created more than `older_than_days` ago.
    pub async fn purge_completed(&self, older_than_days: u32) -> Result<u64> {
        self.purge_completed_before(&days_ago(older_than_days)).await
    }

    /// Delete completed entries created before `cutoff` (persisted timestamp format).
    pub async fn purge_completed_before(&self, cutoff: &str) -> Result<u64> {
        let pool = &self.pool;
        let result = execute_with_retry("queue_purge", || async {
            sqlx::query("DELETE FROM sync_queue WHERE status = 'completed' AND created_at < ?")
                .bind(cutoff)
                .execute(pool)
                .await
        })
        .await;

        match result {
            Ok(done) => {
                let removed = done.rows_affected();
                if removed > 0 {
                    info!(removed, "Purged completed queue entries");
                }
                Ok(removed)
            }
            Err(e) if is_missing_table_error(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
