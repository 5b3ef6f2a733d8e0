// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync orchestrator.
//!
//! Ties together:
//! - the outbound [`SyncQueue`]
//! - the [`LocalStore`] and [`RemoteStore`] collaborators
//! - the [`ConflictResolver`] for divergent records
//!
//! # Architecture
//!
//! A cycle runs in this order:
//! 1. Probes the remote store (when one is configured)
//! 2. Drains the queue, highest priority first
//! 3. Pushes dirty rows and pulls remote documents, table by table
//! 4. Publishes the report to statistics and callbacks
//!
//! At most one cycle runs per orchestrator. A second [`start`](SyncOrchestrator::start)
//! while one is in flight returns [`StartOutcome::AlreadyRunning`].
//!
//! # Example
//!
//! ```rust,no_run
//! use sync_reconciler::orchestrator::{StartOutcome, SyncMode, SyncOrchestrator};
//! use sync_reconciler::store::NoRemote;
//! use sync_reconciler::SyncConfig;
//!
//! # async fn run() -> sync_reconciler::Result<()> {
//! let orchestrator = SyncOrchestrator::open(&SyncConfig::default(), NoRemote).await?;
//!
//! if let StartOutcome::Completed(report) = orchestrator.start(SyncMode::Foreground).await {
//!     println!("pushed {} pulled {}", report.pushed, report.pulled);
//! }
//! # Ok(())
//! # }
//! ```

mod callbacks;
mod cycle;
mod types;

pub use callbacks::SyncCallbacks;
pub use types::{SyncCycleReport, SyncMode, SyncState, SyncStatistics, SyncStatsSnapshot};

use crate::classify::CriticalFields;
use crate::config::{SyncConfig, SyncSettings};
use crate::conflict_log::ConflictLog;
use crate::db;
use crate::error::{ReconcileError, Result};
use crate::metrics;
use crate::queue::{QueueCounts, QueueOperation, QueuePriority, SyncQueue};
use crate::record::Record;
use crate::resolver::ConflictResolver;
use crate::store::{LocalStore, RemoteStore, SqliteLocalStore};
use futures::FutureExt;
use sqlx::SqlitePool;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Result of [`SyncOrchestrator::start`].
#[derive(Debug)]
pub enum StartOutcome {
    /// Another cycle holds the orchestrator; nothing was started.
    AlreadyRunning,
    /// Foreground cycle finished.
    Completed(SyncCycleReport),
    /// Background cycle is running.
    Spawned(CycleHandle),
}

impl StartOutcome {
    pub fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }
}

/// Handle to a background cycle.
///
/// The cycle cannot be cancelled through this handle; it can only be awaited.
/// Dropping the handle detaches the cycle, which still runs to completion.
#[derive(Debug)]
pub struct CycleHandle {
    handle: JoinHandle<SyncCycleReport>,
}

impl CycleHandle {
    /// Wait for the cycle's report.
    pub async fn join(self) -> Result<SyncCycleReport> {
        self.handle
            .await
            .map_err(|e| ReconcileError::Internal(format!("sync task did not complete: {}", e)))
    }
}

/// Ownership of one claim on the state channel.
///
/// Returns the state to `Idle` however the cycle ends, including when its
/// task is dropped before or during the run. Once a later cycle has claimed
/// the orchestrator the guard no longer touches the state.
struct RunningGuard<L: LocalStore, R: RemoteStore> {
    inner: Arc<Inner<L, R>>,
    generation: u64,
}

impl<L: LocalStore, R: RemoteStore> RunningGuard<L, R> {
    /// Publish `state` if this claim is still the latest one.
    fn publish(&self, state: SyncState) -> bool {
        let published = self.inner.state_tx.send_if_modified(|current| {
            if self.inner.claims.load(Ordering::SeqCst) != self.generation || *current == state {
                return false;
            }
            *current = state;
            true
        });
        if published {
            metrics::set_sync_state(&state.to_string());
        }
        published
    }
}

impl<L: LocalStore, R: RemoteStore> Drop for RunningGuard<L, R> {
    fn drop(&mut self) {
        self.publish(SyncState::Idle);
    }
}

struct Inner<L: LocalStore, R: RemoteStore> {
    settings: SyncSettings,
    local: L,
    remote: R,
    queue: SyncQueue,
    resolver: ConflictResolver,
    state_tx: watch::Sender<SyncState>,
    /// Number of successful claims. Only changed while the state channel's
    /// lock is held.
    claims: AtomicU64,
    callbacks: RwLock<SyncCallbacks>,
    stats: RwLock<SyncStatistics>,
}

/// Drives sync cycles between a local and a remote store.
///
/// Cheap to clone; clones share state, statistics and callbacks.
pub struct SyncOrchestrator<L: LocalStore, R: RemoteStore> {
    inner: Arc<Inner<L, R>>,
}

impl<L: LocalStore, R: RemoteStore> Clone for SyncOrchestrator<L, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RemoteStore> SyncOrchestrator<SqliteLocalStore, R> {
    /// Open the configured database and build an orchestrator over it.
    ///
    /// Creates the `sync_queue` and `conflict_log` tables if needed. Entity
    /// tables are the host's; missing ones are skipped by every cycle.
    pub async fn open(config: &SyncConfig, remote: R) -> Result<Self> {
        config.validate()?;
        let pool = db::open_pool(&config.database).await?;
        Self::with_pool(config, pool, remote).await
    }

    /// Build over an existing pool.
    pub async fn with_pool(config: &SyncConfig, pool: SqlitePool, remote: R) -> Result<Self> {
        config.validate()?;
        let queue = SyncQueue::new(pool.clone(), config.settings.queue.max_retries).await?;
        let log = ConflictLog::new(pool.clone()).await?;
        let resolver = ConflictResolver::new(CriticalFields::with_overrides(&config.critical_fields), log);
        Ok(Self::new(
            config.settings.clone(),
            SqliteLocalStore::new(pool),
            remote,
            queue,
            resolver,
        ))
    }
}

impl<L: LocalStore, R: RemoteStore> SyncOrchestrator<L, R> {
    pub fn new(
        settings: SyncSettings,
        local: L,
        remote: R,
        queue: SyncQueue,
        resolver: ConflictResolver,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        Self {
            inner: Arc::new(Inner {
                settings,
                local,
                remote,
                queue,
                resolver,
                state_tx,
                claims: AtomicU64::new(0),
                callbacks: RwLock::new(SyncCallbacks::default()),
                stats: RwLock::new(SyncStatistics::default()),
            }),
        }
    }

    pub fn local(&self) -> &L {
        &self.inner.local
    }

    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.inner.queue
    }

    /// The resolver, for the manual review API.
    pub fn resolver(&self) -> &ConflictResolver {
        &self.inner.resolver
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Get current state.
    pub fn state(&self) -> SyncState {
        *self.inner.state_tx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.state() == SyncState::Running
    }

    /// Replace the lifecycle callbacks. Takes effect from the next cycle.
    pub async fn set_callbacks(&self, callbacks: SyncCallbacks) {
        *self.inner.callbacks.write().await = callbacks;
    }

    /// Start a cycle unless one is already running.
    pub async fn start(&self, mode: SyncMode) -> StartOutcome {
        let Some(generation) = self.try_claim() else {
            info!("Sync already in progress, ignoring start");
            metrics::record_cycle_skipped();
            return StartOutcome::AlreadyRunning;
        };

        let guard = RunningGuard {
            inner: Arc::clone(&self.inner),
            generation,
        };
        match mode {
            SyncMode::Foreground => StartOutcome::Completed(run_claimed(guard).await),
            SyncMode::Background => StartOutcome::Spawned(CycleHandle {
                handle: tokio::spawn(run_claimed(guard)),
            }),
        }
    }

    /// Atomically move to `Running` and return the claim's generation.
    /// `None` if a cycle already holds it.
    fn try_claim(&self) -> Option<u64> {
        let mut generation = None;
        self.inner.state_tx.send_if_modified(|state| {
            if *state == SyncState::Running {
                return false;
            }
            *state = SyncState::Running;
            generation = Some(self.inner.claims.fetch_add(1, Ordering::SeqCst) + 1);
            true
        });
        generation
    }

    /// Cumulative statistics plus live state.
    pub async fn stats(&self) -> Result<SyncStatsSnapshot> {
        let statistics = self.inner.stats.read().await.clone();
        let queue_status = self.queue_status().await?;
        Ok(SyncStatsSnapshot {
            statistics,
            is_syncing: self.is_syncing(),
            queue_status,
        })
    }

    /// Dirty row count per configured table (missing tables count 0).
    pub async fn pending_changes_count(&self) -> Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for table in &self.inner.settings.tables {
            let count = self.inner.local.pending_count(table).await?;
            counts.insert(table.clone(), count);
        }
        Ok(counts)
    }

    /// Queue an outbound operation for the next cycle.
    pub async fn enqueue(
        &self,
        entity_type: &str,
        entity_id: &str,
        operation: QueueOperation,
        payload: Option<&Record>,
        priority: QueuePriority,
    ) -> Result<i64> {
        db::validate_identifier(entity_type)?;
        self.inner
            .queue
            .enqueue(entity_type, entity_id, operation, payload, priority)
            .await
    }

    pub async fn queue_status(&self) -> Result<QueueCounts> {
        let counts = self.inner.queue.status_counts().await?;
        metrics::set_queue_depth(counts.pending, counts.failed);
        Ok(counts)
    }

    /// Remove completed queue entries older than the configured retention.
    pub async fn purge_completed(&self) -> Result<u64> {
        self.inner
            .queue
            .purge_completed(self.inner.settings.queue.retention_days)
            .await
    }
}

/// Run one cycle. The caller has already claimed `Running`.
async fn run_claimed<L: LocalStore, R: RemoteStore>(guard: RunningGuard<L, R>) -> SyncCycleReport {
    let inner = guard.inner.as_ref();
    metrics::set_sync_state("Running");

    let callbacks = inner.callbacks.read().await.clone();
    let started = Instant::now();
    info!(tables = inner.settings.tables.len(), "Sync cycle starting");

    let mut report = SyncCycleReport::default();
    let outcome = AssertUnwindSafe(cycle::run(inner, &callbacks, &mut report))
        .catch_unwind()
        .await;
    let duration = started.elapsed();

    let report = match outcome {
        Ok(Ok(())) => {
            report.duration = duration;
            report.success = report.errors == 0;
            report
        }
        Ok(Err(e)) => {
            error!(error = %e, "Sync cycle failed");
            report.aborted(e.to_string(), duration)
        }
        Err(panic) => {
            let message = format!("sync cycle panicked: {}", panic_message(panic.as_ref()));
            error!(%message, "Sync cycle failed");
            report.aborted(message, duration)
        }
    };

    inner.stats.write().await.record(&report, db::now_timestamp());
    metrics::record_cycle(report.outcome(), report.duration);

    let final_state = if report.is_aborted() {
        SyncState::Failed
    } else {
        SyncState::Completed
    };
    guard.publish(final_state);

    info!(
        pushed = report.pushed,
        pulled = report.pulled,
        conflicts = report.conflicts,
        errors = report.errors,
        duration_ms = report.duration.as_millis() as u64,
        outcome = report.outcome(),
        "Sync cycle finished"
    );

    let notified = std::panic::catch_unwind(AssertUnwindSafe(|| match &report.error {
        None => {
            callbacks.progress("Sync Completed", 100);
            callbacks.finished(&report);
        }
        Some(message) => callbacks.error(message),
    }));
    if notified.is_err() {
        error!("Sync callback panicked");
    }

    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
