// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Collaborator traits for the two stores being reconciled.
//!
//! The orchestrator only ever talks to a [`LocalStore`] and a [`RemoteStore`].
//! The host application provides the remote client; [`SqliteLocalStore`]
//! covers local SQLite tables that carry `id`, `sync_status` and `_remote_id`
//! columns.
//!
//! # Example
//!
//! ```rust,no_run
//! use sync_reconciler::store::{BoxFuture, RemoteResult, RemoteStore};
//! use sync_reconciler::Record;
//!
//! struct HttpRemote { /* ... */ }
//!
//! impl RemoteStore for HttpRemote {
//!     fn ping(&self) -> BoxFuture<'_, RemoteResult<()>> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn find_all(&self, _table: &str) -> BoxFuture<'_, RemoteResult<Vec<Record>>> {
//!         Box::pin(async move { Ok(vec![]) })
//!     }
//!
//!     fn upsert(&self, _table: &str, _document: Record) -> BoxFuture<'_, RemoteResult<String>> {
//!         Box::pin(async move { Ok("new-key".to_string()) })
//!     }
//!
//!     fn delete(&self, _table: &str, _key: &str) -> BoxFuture<'_, RemoteResult<bool>> {
//!         Box::pin(async move { Ok(true) })
//!     }
//! }
//! ```

mod sqlite;

pub use sqlite::SqliteLocalStore;

use crate::error::Result;
use crate::record::Record;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for remote store operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Simplified error for remote store operations.
#[derive(Debug, Clone)]
pub struct RemoteError(pub String);

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RemoteError {}

/// What we need from the remote store.
///
/// Documents carry their key in `_id`. Nested lists and maps are native
/// JSON rather than text.
pub trait RemoteStore: Send + Sync + 'static {
    /// Whether a remote is configured at all.
    ///
    /// An unconfigured remote runs cycles in local-only mode: queue entries
    /// are acknowledged and table push/pull is skipped.
    fn is_configured(&self) -> bool {
        true
    }

    /// Cheap reachability check. The caller bounds it with a timeout.
    fn ping(&self) -> BoxFuture<'_, RemoteResult<()>>;

    /// Every document in `table`.
    fn find_all(&self, table: &str) -> BoxFuture<'_, RemoteResult<Vec<Record>>>;

    /// Insert or replace `document` and return its key.
    fn upsert(&self, table: &str, document: Record) -> BoxFuture<'_, RemoteResult<String>>;

    /// Delete the document with `key`. Returns whether it existed.
    fn delete(&self, table: &str, key: &str) -> BoxFuture<'_, RemoteResult<bool>>;
}

/// The unconfigured remote.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

impl RemoteStore for NoRemote {
    fn is_configured(&self) -> bool {
        false
    }

    fn ping(&self) -> BoxFuture<'_, RemoteResult<()>> {
        Box::pin(async { Err(RemoteError("no remote configured".to_string())) })
    }

    fn find_all(&self, table: &str) -> BoxFuture<'_, RemoteResult<Vec<Record>>> {
        let table = table.to_string();
        Box::pin(async move {
            tracing::trace!(table = %table, "NoRemote: nothing to pull");
            Ok(Vec::new())
        })
    }

    fn upsert(&self, table: &str, _document: Record) -> BoxFuture<'_, RemoteResult<String>> {
        let table = table.to_string();
        Box::pin(async move { Err(RemoteError(format!("no remote configured for {}", table))) })
    }

    fn delete(&self, table: &str, _key: &str) -> BoxFuture<'_, RemoteResult<bool>> {
        let table = table.to_string();
        Box::pin(async move { Err(RemoteError(format!("no remote configured for {}", table))) })
    }
}

/// One write produced by pulling remote documents.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalWrite {
    /// A document not yet known locally.
    Insert(Record),
    /// Replace the row with local primary key `id`.
    Update { id: Value, record: Record },
}

/// What we need from the local store.
///
/// Every write made through this trait leaves the row `synced`.
pub trait LocalStore: Send + Sync + 'static {
    fn table_exists(&self, table: &str) -> BoxFuture<'_, Result<bool>>;

    /// Rows whose sync status is `new_offline` or `modified_offline`.
    fn dirty_rows(&self, table: &str) -> BoxFuture<'_, Result<Vec<Record>>>;

    /// Row by local primary key.
    fn find(&self, table: &str, id: &str) -> BoxFuture<'_, Result<Option<Record>>>;

    /// Row by remote key (`_remote_id`).
    fn find_by_remote_id(&self, table: &str, key: &str) -> BoxFuture<'_, Result<Option<Record>>>;

    /// Mark the row `synced`, recording `remote_key` when given.
    /// Returns whether a row matched.
    fn mark_synced(&self, table: &str, id: Value, remote_key: Option<String>) -> BoxFuture<'_, Result<bool>>;

    /// Apply a table's pulled writes in one transaction. Returns rows written.
    fn apply_pull_batch(&self, table: &str, writes: Vec<LocalWrite>) -> BoxFuture<'_, Result<usize>>;

    /// Dirty row count; 0 for missing tables.
    fn pending_count(&self, table: &str) -> BoxFuture<'_, Result<u64>>;
}
