// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Orchestrator state and report types.
//!
//! # State Transitions
//!
//! ```text
//!            start()                 errors == 0 or table errors
//! Idle ─────────────────→ Running ─────────────────────────────→ Completed
//!   ↑                        │                                       │
//!   │                        │ probe failed / unexpected error / panic│
//!   │                        ↓                                       │
//!   │                     Failed                                     │
//!   │                        │                                       │
//!   └────────────────────────┴───────────────────────────────────────┘
//!                       (cycle released)
//! ```
//!
//! `Completed` and `Failed` are published for watchers and then immediately
//! give way to `Idle`; only `Running` blocks a new cycle.

use crate::queue::QueueCounts;
use serde::Serialize;
use std::time::Duration;

/// State of the sync orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    /// No cycle in flight.
    Idle,
    /// A cycle owns the orchestrator.
    Running,
    /// The last cycle ran to the end (possibly with isolated table errors).
    Completed,
    /// The last cycle aborted.
    Failed,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "Idle"),
            SyncState::Running => write!(f, "Running"),
            SyncState::Completed => write!(f, "Completed"),
            SyncState::Failed => write!(f, "Failed"),
        }
    }
}

/// How [`start`](super::SyncOrchestrator::start) runs the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Run on the caller's task and return the report.
    Foreground,
    /// Spawn one task and return its handle immediately.
    Background,
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncCycleReport {
    /// Rows and queue entries transmitted to the remote store.
    pub pushed: usize,
    /// Local rows inserted or updated from remote documents.
    pub pulled: usize,
    /// Records left pending review.
    pub conflicts: usize,
    /// Isolated failures (queue entries, table push, table pull).
    pub errors: usize,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// `errors == 0` and the cycle was not aborted.
    pub success: bool,
    /// Why the cycle aborted, if it did.
    pub error: Option<String>,
}

impl SyncCycleReport {
    /// Report for a cycle that aborted with `message`.
    pub fn aborted(mut self, message: impl Into<String>, duration: Duration) -> Self {
        self.errors += 1;
        self.duration = duration;
        self.success = false;
        self.error = Some(message.into());
        self
    }

    /// Whether the cycle aborted rather than ran to the end.
    pub fn is_aborted(&self) -> bool {
        self.error.is_some()
    }

    /// `success`, `partial` or `failed`.
    pub fn outcome(&self) -> &'static str {
        if self.is_aborted() {
            "failed"
        } else if self.success {
            "success"
        } else {
            "partial"
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

/// Cumulative statistics, owned by one orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatistics {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    /// Cycles that ran to the end with isolated errors.
    pub partial_syncs: u64,
    pub failed_syncs: u64,
    pub total_pushed: u64,
    pub total_pulled: u64,
    pub total_conflicts: u64,
    /// RFC 3339 time the last cycle finished.
    pub last_sync: Option<String>,
    pub last_report: Option<SyncCycleReport>,
}

impl SyncStatistics {
    pub(crate) fn record(&mut self, report: &SyncCycleReport, finished_at: String) {
        self.total_syncs += 1;
        match report.outcome() {
            "success" => self.successful_syncs += 1,
            "partial" => self.partial_syncs += 1,
            _ => self.failed_syncs += 1,
        }
        self.total_pushed += report.pushed as u64;
        self.total_pulled += report.pulled as u64;
        self.total_conflicts += report.conflicts as u64;
        self.last_sync = Some(finished_at);
        self.last_report = Some(report.clone());
    }
}

/// Statistics plus live state, as returned by
/// [`stats`](super::SyncOrchestrator::stats).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatsSnapshot {
    #[serde(flatten)]
    pub statistics: SyncStatistics,
    pub is_syncing: bool,
    pub queue_status: QueueCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_display() {
        assert_eq!(SyncState::Idle.to_string(), "Idle");
        assert_eq!(SyncState::Running.to_string(), "Running");
        assert_eq!(SyncState::Completed.to_string(), "Completed");
        assert_eq!(SyncState::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_report_outcome() {
        let ok = SyncCycleReport { success: true, ..Default::default() };
        assert_eq!(ok.outcome(), "success");

        let partial = SyncCycleReport { errors: 2, success: false, ..Default::default() };
        assert_eq!(partial.outcome(), "partial");

        let failed = SyncCycleReport::default().aborted("remote unreachable", Duration::from_millis(5));
        assert_eq!(failed.outcome(), "failed");
        assert_eq!(failed.errors, 1);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("remote unreachable"));
    }

    #[test]
    fn test_statistics_accumulate() {
        let mut stats = SyncStatistics::default();
        let ok = SyncCycleReport { pushed: 3, pulled: 2, conflicts: 1, success: true, ..Default::default() };
        let partial = SyncCycleReport { pushed: 1, errors: 1, ..Default::default() };
        let failed = SyncCycleReport::default().aborted("boom", Duration::ZERO);

        stats.record(&ok, "2026-01-01T00:00:00.000Z".to_string());
        stats.record(&partial, "2026-01-01T00:01:00.000Z".to_string());
        stats.record(&failed, "2026-01-01T00:02:00.000Z".to_string());

        assert_eq!(stats.total_syncs, 3);
        assert_eq!(stats.successful_syncs, 1);
        assert_eq!(stats.partial_syncs, 1);
        assert_eq!(stats.failed_syncs, 1);
        assert_eq!(stats.total_pushed, 4);
        assert_eq!(stats.total_pulled, 2);
        assert_eq!(stats.total_conflicts, 1);
        assert_eq!(stats.last_sync.as_deref(), Some("2026-01-01T00:02:00.000Z"));
        assert_eq!(stats.last_report, Some(failed));
    }

    #[test]
    fn test_report_serializes_duration_as_seconds() {
        let report = SyncCycleReport {
            duration: Duration::from_millis(1500),
            success: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["duration"], serde_json::json!(1.5));
        assert_eq!(json["success"], serde_json::json!(true));
    }
}
