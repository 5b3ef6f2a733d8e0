// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the reconciliation core.
//!
//! Configuration is passed to [`SyncOrchestrator::new()`](crate::SyncOrchestrator::new)
//! and can be constructed programmatically or deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use sync_reconciler::config::SyncConfig;
//!
//! let config = SyncConfig::for_testing();
//! assert_eq!(config.database.sqlite_path, ":memory:");
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! SyncConfig
//! ├── database: DatabaseConfig        # SQLite file shared by queue, log, tables
//! ├── settings: SyncSettings
//! │   ├── queue: QueueConfig          # drain limit, retry budget, retention
//! │   ├── connectivity: ConnectivityConfig  # probe timeout
//! │   └── tables: Vec<String>         # push/pull order
//! └── critical_fields: {table: [field]}     # overrides of the built-in sets
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "database": { "sqlite_path": "/var/lib/app/business.db" },
//!   "settings": {
//!     "queue": { "drain_limit": 50, "max_retries": 5 },
//!     "connectivity": { "probe_timeout": "3s" }
//!   },
//!   "critical_fields": { "clients": ["tax_id"] }
//! }
//! ```

use crate::db::validate_identifier;
use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Tables synchronized by default, in dependency order.
pub const DEFAULT_TABLES: &[&str] = &[
    "accounts",
    "clients",
    "projects",
    "invoices",
    "payments",
    "expenses",
    "journal_entries",
    "quotations",
];

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// SQLite database holding the queue, the conflict log and entity tables.
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub settings: SyncSettings,

    /// Per-table critical field overrides. A table listed here replaces its
    /// built-in set; unlisted tables keep theirs.
    #[serde(default)]
    pub critical_fields: BTreeMap<String, Vec<String>>,
}

impl SyncConfig {
    /// Create a minimal config for testing (in-memory database, short probe).
    pub fn for_testing() -> Self {
        Self {
            database: DatabaseConfig::in_memory(),
            settings: SyncSettings {
                connectivity: ConnectivityConfig {
                    probe_timeout: "200ms".to_string(),
                },
                ..Default::default()
            },
            critical_fields: BTreeMap::new(),
        }
    }

    /// Check the config for values that would make a cycle misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.database.sqlite_path.trim().is_empty() {
            return Err(ReconcileError::Config("database.sqlite_path is empty".to_string()));
        }

        let queue = &self.settings.queue;
        if queue.drain_limit == 0 {
            return Err(ReconcileError::Config("queue.drain_limit must be positive".to_string()));
        }
        if queue.max_retries == 0 {
            return Err(ReconcileError::Config("queue.max_retries must be positive".to_string()));
        }

        humantime::parse_duration(&self.settings.connectivity.probe_timeout).map_err(|e| {
            ReconcileError::Config(format!(
                "connectivity.probe_timeout {:?}: {}",
                self.settings.connectivity.probe_timeout, e
            ))
        })?;

        let mut seen = HashSet::new();
        for table in &self.settings.tables {
            validate_identifier(table)?;
            if !seen.insert(table.as_str()) {
                return Err(ReconcileError::Config(format!("table {:?} listed twice", table)));
            }
        }
        for table in self.critical_fields.keys() {
            validate_identifier(table)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SyncSettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Tunables for one sync cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    /// Entity tables, visited in this order every cycle.
    #[serde(default = "default_tables")]
    pub tables: Vec<String>,
}

fn default_tables() -> Vec<String> {
    DEFAULT_TABLES.iter().map(|t| t.to_string()).collect()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            connectivity: ConnectivityConfig::default(),
            tables: default_tables(),
        }
    }
}

/// Outbound queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum entries processed per cycle.
    #[serde(default = "default_drain_limit")]
    pub drain_limit: u32,

    /// Attempts before an entry becomes terminally failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Age (days) after which completed entries may be purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_drain_limit() -> u32 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_retention_days() -> u32 {
    7
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_limit: 100,
            max_retries: 3,
            retention_days: 7,
        }
    }
}

/// Remote reachability check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Upper bound for the pre-cycle ping, as a duration string (e.g. "2s").
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: String,
}

fn default_probe_timeout() -> String {
    "2s".to_string()
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_timeout: default_probe_timeout(),
        }
    }
}

impl ConnectivityConfig {
    /// Parse the probe_timeout string to a Duration.
    pub fn probe_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.probe_timeout).unwrap_or(Duration::from_secs(2))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DatabaseConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// SQLite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database, or `:memory:`.
    pub sqlite_path: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "sync_reconciler.db".to_string(),
            wal_mode: true,
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path == ":memory:"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
