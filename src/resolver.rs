// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Conflict detection and resolution for one local/remote record pair.
//!
//! # Decision Flow
//!
//! ```text
//! strip bookkeeping ──► equal? ──yes──► UseRemote ("identical")
//!                         │
//!                         no
//!                         ▼
//!                       diff ──empty──► UseRemote ("no significant differences")
//!                         │
//!                         ▼
//!                     classify ──any critical──► log CRITICAL ─► PendingReview(local)
//!                         │
//!                    none critical
//!                         ▼
//!                       merge ──────────────────────────────► AutoMerged(merged)
//! ```
//!
//! Only the review path writes to the [`ConflictLog`]. A failed log write is
//! reported with a warning and the decision is returned without a conflict
//! id; the local row is still left untouched.

use crate::classify::CriticalFields;
use crate::conflict_log::{ConflictKind, ConflictLog, ConflictLogEntry, NewConflict, ResolutionChoice};
use crate::diff::diff;
use crate::error::Result;
use crate::merge::merge;
use crate::record::{entity_id, entity_name, strip_ignored, Record};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of reconciling one record pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConflictDecision {
    /// Nothing meaningful differs; the remote document stands.
    UseRemote { record: Record, reason: String },

    /// Only non-critical fields differed; `record` is the merge result.
    AutoMerged {
        record: Record,
        fields: Vec<String>,
        reason: String,
    },

    /// Critical fields differ; `record` is the local row, unchanged.
    PendingReview {
        record: Record,
        /// Every differing field, critical first.
        fields: Vec<String>,
        critical: Vec<String>,
        /// Log entry id, absent when the log write failed.
        conflict_id: Option<i64>,
        reason: String,
    },
}

impl ConflictDecision {
    pub fn requires_review(&self) -> bool {
        matches!(self, Self::PendingReview { .. })
    }

    /// The record the caller should keep.
    pub fn record(&self) -> &Record {
        match self {
            Self::UseRemote { record, .. }
            | Self::AutoMerged { record, .. }
            | Self::PendingReview { record, .. } => record,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            Self::UseRemote { record, .. }
            | Self::AutoMerged { record, .. }
            | Self::PendingReview { record, .. } => record,
        }
    }

    pub fn conflicting_fields(&self) -> &[String] {
        match self {
            Self::UseRemote { .. } => &[],
            Self::AutoMerged { fields, .. } | Self::PendingReview { fields, .. } => fields,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::UseRemote { reason, .. }
            | Self::AutoMerged { reason, .. }
            | Self::PendingReview { reason, .. } => reason,
        }
    }

    /// Short label for logs and metrics.
    pub fn action(&self) -> &'static str {
        match self {
            Self::UseRemote { .. } => "use_remote",
            Self::AutoMerged { .. } => "auto_merged",
            Self::PendingReview { .. } => "pending_review",
        }
    }
}

/// Composes diff, classification, merge and the conflict log.
#[derive(Clone)]
pub struct ConflictResolver {
    critical: CriticalFields,
    log: ConflictLog,
}

impl ConflictResolver {
    pub fn new(critical: CriticalFields, log: ConflictLog) -> Self {
        Self { critical, log }
    }

    pub fn critical_fields(&self) -> &CriticalFields {
        &self.critical
    }

    pub fn log(&self) -> &ConflictLog {
        &self.log
    }

    /// Decide what to keep for one `table` record pair.
    pub async fn detect_and_resolve(&self, table: &str, local: &Record, remote: &Record) -> ConflictDecision {
        if strip_ignored(local) == strip_ignored(remote) {
            return ConflictDecision::UseRemote {
                record: remote.clone(),
                reason: "identical".to_string(),
            };
        }

        let differences = diff(local, remote);
        if differences.is_empty() {
            return ConflictDecision::UseRemote {
                record: remote.clone(),
                reason: "no significant differences".to_string(),
            };
        }

        let (critical, noncritical) = self.critical.classify(table, &differences.fields());

        if critical.is_empty() {
            let merged = merge(local, remote, &noncritical);
            info!(
                table,
                entity_id = %entity_id(local),
                fields = ?noncritical,
                "Auto-merged non-critical fields"
            );
            return ConflictDecision::AutoMerged {
                record: merged,
                reason: format!("auto-merged fields: {}", noncritical.join(", ")),
                fields: noncritical,
            };
        }

        let fields: Vec<String> = critical.iter().chain(noncritical.iter()).cloned().collect();
        let entity = entity_id(local);
        warn!(table, entity_id = %entity, critical = ?critical, "Critical conflict, holding local record for review");

        let conflict = NewConflict {
            table_name: table.to_string(),
            entity_id: entity.clone(),
            entity_name: entity_name(local),
            local_data: local.clone(),
            remote_data: remote.clone(),
            kind: ConflictKind::Critical,
            conflicting_fields: fields.clone(),
        };
        let conflict_id = match self.log.append(&conflict).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(table, entity_id = %entity, error = %e, "Failed to log conflict");
                crate::metrics::record_conflict_log_failure(table);
                None
            }
        };

        ConflictDecision::PendingReview {
            record: local.clone(),
            reason: format!("critical fields changed: {}", critical.join(", ")),
            fields,
            critical,
            conflict_id,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Manual review
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_pending(&self, table: Option<&str>) -> Result<Vec<ConflictLogEntry>> {
        self.log.list_pending(table).await
    }

    pub async fn count_pending(&self) -> Result<u64> {
        self.log.count_pending().await
    }

    /// Record a reviewer's choice. The chosen snapshot is not written back;
    /// fetch it with [`ConflictLogEntry::chosen_record`] and re-submit it.
    pub async fn resolve(&self, id: i64, choice: ResolutionChoice, resolved_by: &str) -> Result<bool> {
        let resolved = self.log.resolve(id, choice, resolved_by).await?;
        if !resolved {
            debug!(conflict_id = id, "No pending conflict to resolve");
        }
        Ok(resolved)
    }

    pub async fn history(&self, limit: u32) -> Result<Vec<ConflictLogEntry>> {
        self.log.history(limit).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<ConflictLogEntry>> {
        self.log.get(id).await
    }

    pub async fn purge_resolved(&self, older_than_days: u32) -> Result<u64> {
        self.log.purge_resolved(older_than_days).await
    }
}
