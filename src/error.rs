// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the reconciliation core.
//!
//! Errors are categorized by their source (SQLite, remote store, configuration)
//! and carry enough context to tell which table or operation failed.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Database` | No | Local SQLite errors (busy/locked is retried before surfacing) |
//! | `Serialization` | No | Snapshot or payload could not be (de)serialized |
//! | `Connectivity` | Yes | Remote configured but unreachable |
//! | `Remote` | Yes | A push/pull call against the remote store failed |
//! | `Config` | No | Configuration invalid |
//! | `InvalidIdentifier` | No | Table or column name rejected before reaching SQL |
//! | `InvalidData` | No | Persisted row could not be decoded |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! A cycle that fails with a retryable error is simply re-run later: rows that
//! were not marked SYNCED are picked up again, and queue entries keep their
//! retry budget.

use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that can occur while reconciling local and remote stores.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// SQLite error in the queue, the conflict log or an entity table.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization of a snapshot or payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A remote store is configured but did not answer the connectivity probe.
    ///
    /// Aborts the whole cycle before any queue or table work.
    #[error("Remote unreachable: {0}")]
    Connectivity(String),

    /// A push/pull call against the remote store failed.
    ///
    /// Isolated to the table (or queue entry) that issued it.
    #[error("Remote error ({operation} {table}): {message}")]
    Remote {
        table: String,
        operation: String,
        message: String,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A table or column name that is not a plain SQL identifier.
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A persisted row holds a value we cannot decode.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    /// Create a remote error for a table operation.
    pub fn remote(
        table: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Remote {
            table: table.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connectivity(_) => true,
            Self::Remote { .. } => true,
            Self::Database(_) => false,
            Self::Serialization(_) => false,
            Self::Config(_) => false,
            Self::InvalidIdentifier(_) => false,
            Self::InvalidData(_) => false,
            Self::Internal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_connectivity() {
        let err = ReconcileError::Connectivity("probe timed out after 2s".to_string());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("probe timed out"));
    }

    #[test]
    fn test_is_retryable_remote() {
        let err = ReconcileError::remote("invoices", "upsert", "503 service unavailable");
        assert!(err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("upsert"));
        assert!(msg.contains("invoices"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn test_not_retryable_config() {
        let err = ReconcileError::Config("drain_limit must be positive".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_retryable_database() {
        let err = ReconcileError::Database(sqlx::Error::RowNotFound);
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("Database error"));
    }

    #[test]
    fn test_not_retryable_invalid_identifier() {
        let err = ReconcileError::InvalidIdentifier("users; DROP TABLE x".to_string());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("DROP TABLE"));
    }

    #[test]
    fn test_serialization_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ReconcileError = parse_err.into();
        assert!(matches!(err, ReconcileError::Serialization(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_retryable_internal() {
        let err = ReconcileError::Internal("cycle panicked".to_string());
        assert!(!err.is_retryable());
    }
}
