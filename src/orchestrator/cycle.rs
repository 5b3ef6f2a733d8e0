// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! One sync cycle: probe, drain the queue, then push and pull each table.
//!
//! # Error Isolation
//!
//! | Failure                      | Effect                                   |
//! |------------------------------|------------------------------------------|
//! | Connectivity probe           | Cycle aborts before any queue/table work |
//! | One queue entry              | Entry marked failed, errors + 1          |
//! | Push of a table              | errors + 1, pull of that table still runs|
//! | Pull of a table              | errors + 1, that table's writes rolled back |
//! | Queue/log bookkeeping itself | Cycle aborts                             |

use super::callbacks::SyncCallbacks;
use super::types::SyncCycleReport;
use super::Inner;
use crate::error::{ReconcileError, Result};
use crate::metrics;
use crate::queue::{QueueEntry, QueueOperation};
use crate::record::{as_key, entity_id, prepare_for_local, prepare_for_remote, remote_key, Record, RowSyncStatus, LOCAL_ID_FIELD, REMOTE_ALIAS_FIELD, SYNC_STATUS_FIELD};
use crate::resolver::ConflictDecision;
use crate::store::{LocalStore, LocalWrite, RemoteStore};
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Run the cycle body, accumulating counts into `report`.
///
/// An `Err` aborts the cycle; isolated failures only bump `report.errors`.
pub(super) async fn run<L: LocalStore, R: RemoteStore>(
    inner: &Inner<L, R>,
    callbacks: &SyncCallbacks,
    report: &mut SyncCycleReport,
) -> Result<()> {
    callbacks.started();

    let remote_configured = inner.remote.is_configured();
    if remote_configured {
        probe(&inner.remote, inner.settings.connectivity.probe_timeout_duration()).await?;
    } else {
        debug!("No remote configured, running local-only cycle");
    }

    process_queue(inner, remote_configured, report).await?;

    let total = inner.settings.tables.len();
    for (idx, table) in inner.settings.tables.iter().enumerate() {
        let percent = (idx * 100 / total.max(1)) as u8;
        callbacks.progress(&format!("Syncing {}...", table), percent);

        if !remote_configured {
            continue;
        }
        sync_table(inner, table, report).await;
    }

    Ok(())
}

/// Bounded reachability check against the remote store.
async fn probe<R: RemoteStore>(remote: &R, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, remote.ping()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ReconcileError::Connectivity(e.0)),
        Err(_) => Err(ReconcileError::Connectivity(format!(
            "probe timed out after {}",
            humantime::format_duration(timeout)
        ))),
    };
    metrics::record_connectivity_probe(result.is_ok(), start.elapsed());
    if let Err(e) = &result {
        warn!(error = %e, "Remote store unreachable, skipping cycle");
    }
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// Outbound queue
// ═══════════════════════════════════════════════════════════════════════════════

async fn process_queue<L: LocalStore, R: RemoteStore>(
    inner: &Inner<L, R>,
    remote_configured: bool,
    report: &mut SyncCycleReport,
) -> Result<()> {
    let entries = inner.queue.drain(inner.settings.queue.drain_limit).await?;
    if entries.is_empty() {
        return Ok(());
    }
    debug!(count = entries.len(), "Processing sync queue");

    for entry in &entries {
        let outcome = if remote_configured {
            transmit(inner, entry).await
        } else {
            Ok(())
        };

        match outcome {
            Ok(()) => {
                inner.queue.mark_completed(entry.id).await?;
                metrics::record_queue_entry(entry.operation.as_str(), "completed");
                report.pushed += 1;
            }
            Err(e) => {
                let retryable = e.is_retryable();
                warn!(
                    queue_id = entry.id,
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    error = %e,
                    retryable,
                    "Queue entry failed"
                );
                if retryable {
                    inner.queue.mark_failed(entry.id, &e.to_string()).await?;
                    metrics::record_queue_entry(entry.operation.as_str(), "failed");
                } else {
                    inner.queue.mark_abandoned(entry.id, &e.to_string()).await?;
                    metrics::record_queue_entry(entry.operation.as_str(), "abandoned");
                }
                report.errors += 1;
            }
        }
    }
    Ok(())
}

/// Send one queue entry to the remote store.
async fn transmit<L: LocalStore, R: RemoteStore>(inner: &Inner<L, R>, entry: &QueueEntry) -> Result<()> {
    let table = entry.entity_type.as_str();
    match entry.operation {
        QueueOperation::Create | QueueOperation::Update => {
            let row = match &entry.payload {
                Some(payload) => payload.clone(),
                None => inner.local.find(table, &entry.entity_id).await?.ok_or_else(|| {
                    ReconcileError::InvalidData(format!(
                        "no payload and no local row for {}/{}",
                        table, entry.entity_id
                    ))
                })?,
            };
            let key = inner
                .remote
                .upsert(table, prepare_for_remote(&row))
                .await
                .map_err(|e| ReconcileError::remote(table, "upsert", e.0))?;

            if inner.local.table_exists(table).await? {
                let id = Value::String(entry.entity_id.clone());
                inner.local.mark_synced(table, id, Some(key)).await?;
            }
        }
        QueueOperation::Delete => {
            let key = entry
                .payload
                .as_ref()
                .and_then(|payload| payload.get(REMOTE_ALIAS_FIELD))
                .and_then(as_key)
                .unwrap_or_else(|| entry.entity_id.clone());
            let existed = inner
                .remote
                .delete(table, &key)
                .await
                .map_err(|e| ReconcileError::remote(table, "delete", e.0))?;
            if !existed {
                debug!(table, key = %key, "Remote document already gone");
            }
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tables
// ═══════════════════════════════════════════════════════════════════════════════

#[instrument(skip_all, fields(table = %table))]
async fn sync_table<L: LocalStore, R: RemoteStore>(
    inner: &Inner<L, R>,
    table: &str,
    report: &mut SyncCycleReport,
) {
    match inner.local.table_exists(table).await {
        Ok(true) => {}
        Ok(false) => {
            debug!("Local table missing, skipping");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Could not inspect local table");
            report.errors += 1;
            metrics::record_table_error(table, "push");
            return;
        }
    }

    match push_table(inner, table).await {
        Ok(pushed) => {
            report.pushed += pushed;
            metrics::record_pushed(table, pushed);
        }
        Err((pushed, e)) => {
            warn!(error = %e, pushed, "Push failed");
            report.pushed += pushed;
            report.errors += 1;
            metrics::record_pushed(table, pushed);
            metrics::record_table_error(table, "push");
        }
    }

    match pull_table(inner, table).await {
        Ok((pulled, conflicts)) => {
            report.pulled += pulled;
            report.conflicts += conflicts;
            metrics::record_pulled(table, pulled);
            if pulled > 0 || conflicts > 0 {
                info!(pulled, conflicts, "Pulled remote changes");
            }
        }
        Err(e) => {
            warn!(error = %e, "Pull failed");
            report.errors += 1;
            metrics::record_table_error(table, "pull");
        }
    }
}

/// Upload dirty rows. Stops at the first failure and reports how many rows
/// made it before it.
async fn push_table<L: LocalStore, R: RemoteStore>(
    inner: &Inner<L, R>,
    table: &str,
) -> std::result::Result<usize, (usize, ReconcileError)> {
    let rows = inner.local.dirty_rows(table).await.map_err(|e| (0, e))?;
    let mut pushed = 0;

    for row in rows {
        let Some(id) = row.get(LOCAL_ID_FIELD).cloned() else {
            warn!("Dirty row without id, skipping");
            continue;
        };
        let key = inner
            .remote
            .upsert(table, prepare_for_remote(&row))
            .await
            .map_err(|e| (pushed, ReconcileError::remote(table, "upsert", e.0)))?;
        inner
            .local
            .mark_synced(table, id, Some(key))
            .await
            .map_err(|e| (pushed, e))?;
        pushed += 1;
    }

    Ok(pushed)
}

/// Fetch remote documents and reconcile them with local rows.
///
/// Returns `(rows written, records left for review)`. All writes for the
/// table are applied in one local transaction.
async fn pull_table<L: LocalStore, R: RemoteStore>(inner: &Inner<L, R>, table: &str) -> Result<(usize, usize)> {
    let documents = inner
        .remote
        .find_all(table)
        .await
        .map_err(|e| ReconcileError::remote(table, "find_all", e.0))?;
    if documents.is_empty() {
        return Ok((0, 0));
    }

    // Entities already waiting for a reviewer are not re-logged every cycle.
    let under_review: HashSet<String> = inner
        .resolver
        .list_pending(Some(table))
        .await?
        .into_iter()
        .map(|entry| entry.entity_id)
        .collect();

    let mut writes = Vec::new();
    let mut conflicts = 0;

    for document in &documents {
        let Some(key) = remote_key(document) else {
            warn!("Remote document without key, skipping");
            continue;
        };
        let incoming = prepare_for_local(document);

        let Some(local) = inner.local.find_by_remote_id(table, &key).await? else {
            writes.push(LocalWrite::Insert(incoming));
            continue;
        };

        if is_dirty(&local) {
            debug!(remote_key = %key, "Local row has unsent changes, leaving it for the next push");
            continue;
        }
        if under_review.contains(&entity_id(&local)) {
            conflicts += 1;
            continue;
        }

        let decision = inner.resolver.detect_and_resolve(table, &local, &incoming).await;
        metrics::record_decision(table, decision.action());
        match decision {
            ConflictDecision::UseRemote { .. } => {}
            ConflictDecision::AutoMerged { record, .. } => {
                if let Some(id) = local.get(LOCAL_ID_FIELD).cloned() {
                    writes.push(LocalWrite::Update { id, record });
                }
            }
            ConflictDecision::PendingReview { .. } => conflicts += 1,
        }
    }

    let pulled = inner.local.apply_pull_batch(table, writes).await?;
    Ok((pulled, conflicts))
}

fn is_dirty(row: &Record) -> bool {
    row.get(SYNC_STATUS_FIELD)
        .and_then(Value::as_str)
        .and_then(|status| status.parse::<RowSyncStatus>().ok())
        .is_some_and(|status| RowSyncStatus::DIRTY.contains(&status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_is_dirty() {
        assert!(is_dirty(&row(json!({"id": 1, "sync_status": "new_offline"}))));
        assert!(is_dirty(&row(json!({"id": 1, "sync_status": "modified_offline"}))));
        assert!(!is_dirty(&row(json!({"id": 1, "sync_status": "synced"}))));
        assert!(!is_dirty(&row(json!({"id": 1}))));
        assert!(!is_dirty(&row(json!({"id": 1, "sync_status": "bogus"}))));
    }
}
