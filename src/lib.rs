//! # Sync Reconciler
//!
//! Keeps an offline-capable local SQLite store reconciled with a remote
//! document store, without silently losing financially significant edits.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                             sync-reconciler                               │
//! │                                                                           │
//! │  local writes ──► ┌───────────┐    ┌──────────────────┐    ┌───────────┐  │
//! │                   │ SyncQueue │───►│ SyncOrchestrator │◄──►│ Remote    │  │
//! │                   │ (SQLite)  │    │ push / pull      │    │ Store     │  │
//! │                   └───────────┘    └──────────────────┘    └───────────┘  │
//! │                                             │ divergent record            │
//! │                                             ▼                             │
//! │   ┌────────────┐  ┌──────┐  ┌──────────┐  ┌───────┐  ┌────────────────┐   │
//! │   │ Comparator │─►│ Diff │─►│ Classify │─►│ Merge │  │ ConflictLog    │   │
//! │   └────────────┘  └──────┘  └──────────┘  └───────┘  │ (manual review)│   │
//! │                        ConflictResolver ────────────►└────────────────┘   │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Decisions
//!
//! For every remote document that differs from its local row, the
//! [`ConflictResolver`] either keeps the remote copy, merges non-critical
//! fields automatically, or freezes the local row and logs a `CRITICAL`
//! conflict for a reviewer. Critical fields are per table (amounts, line
//! items, dates) and configurable.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sync_reconciler::orchestrator::{StartOutcome, SyncMode, SyncOrchestrator};
//! use sync_reconciler::queue::{QueueOperation, QueuePriority};
//! use sync_reconciler::store::NoRemote;
//! use sync_reconciler::SyncConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = SyncOrchestrator::open(&SyncConfig::default(), NoRemote)
//!         .await
//!         .expect("Failed to open database");
//!
//!     orchestrator
//!         .enqueue("invoices", "42", QueueOperation::Update, None, QueuePriority::High)
//!         .await
//!         .expect("Failed to queue");
//!
//!     if let StartOutcome::Spawned(handle) = orchestrator.start(SyncMode::Background).await {
//!         let report = handle.join().await.expect("Sync task lost");
//!         println!("{:?}", report);
//!     }
//! }
//! ```

pub mod classify;
pub mod compare;
pub mod config;
pub mod conflict_log;
pub mod db;
pub mod diff;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod record;
pub mod resolver;
pub mod store;

// Re-exports for convenience
pub use classify::CriticalFields;
pub use compare::values_equal;
pub use config::{DatabaseConfig, QueueConfig, ConnectivityConfig, SyncConfig, SyncSettings};
pub use conflict_log::{ConflictLog, ConflictLogEntry, ConflictStatus, ResolutionChoice};
pub use diff::{diff, Diff, FieldDiff};
pub use error::{ReconcileError, Result};
pub use merge::merge;
pub use orchestrator::{StartOutcome, SyncCycleReport, SyncMode, SyncOrchestrator, SyncState};
pub use queue::{QueueEntry, QueueOperation, QueuePriority, QueueStatus, SyncQueue};
pub use record::Record;
pub use resolver::{ConflictDecision, ConflictResolver};
pub use store::{LocalStore, NoRemote, RemoteStore, SqliteLocalStore};
