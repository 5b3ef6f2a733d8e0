//! Mock RemoteStore for testing.
//!
//! Holds documents in memory per table and records every upsert/delete for
//! assertions. Failures, an unreachable remote, a slow or gated ping and a
//! panicking pull can be switched on per test.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_reconciler::store::{BoxFuture, RemoteError, RemoteResult, RemoteStore};
use sync_reconciler::Record;
use tokio::sync::{Notify, RwLock};

/// A recorded upsert() call.
#[derive(Debug, Clone)]
pub struct UpsertCall {
    pub table: String,
    pub document: Record,
    pub key: String,
}

/// A recorded delete() call.
#[derive(Debug, Clone)]
pub struct DeleteCall {
    pub table: String,
    pub key: String,
}

/// In-memory remote store that records all calls.
///
/// # Example
/// ```rust,ignore
/// let remote = MockRemote::new();
/// remote.insert("clients", json!({"_id": "c-1", "name": "Acme"})).await;
///
/// // Run a cycle...
///
/// let upserts = remote.upserted().await;
/// assert_eq!(upserts.len(), 2);
/// ```
pub struct MockRemote {
    /// Documents by table, in insertion order
    documents: RwLock<HashMap<String, Vec<Record>>>,
    /// Recorded upsert() calls
    upserts: RwLock<Vec<UpsertCall>>,
    /// Recorded delete() calls
    deletes: RwLock<Vec<DeleteCall>>,
    /// Whether ping() answers
    reachable: AtomicBool,
    /// Extra latency for ping()
    ping_delay: Mutex<Option<Duration>>,
    /// ping() waits for a permit when set
    ping_gate: Mutex<Option<Arc<Notify>>>,
    /// Tables whose calls fail
    failing_tables: Mutex<HashSet<String>>,
    /// Table whose find_all() panics
    panic_table: Mutex<Option<String>>,
    /// Simulate upsert failures after N calls
    fail_after_upserts: AtomicUsize,
    /// Counter for upsert calls
    upsert_count: AtomicUsize,
    /// Counter for generated keys
    next_key: AtomicUsize,
}

impl MockRemote {
    /// Create a reachable, empty remote.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            upserts: RwLock::new(Vec::new()),
            deletes: RwLock::new(Vec::new()),
            reachable: AtomicBool::new(true),
            ping_delay: Mutex::new(None),
            ping_gate: Mutex::new(None),
            failing_tables: Mutex::new(HashSet::new()),
            panic_table: Mutex::new(None),
            fail_after_upserts: AtomicUsize::new(usize::MAX),
            upsert_count: AtomicUsize::new(0),
            next_key: AtomicUsize::new(1),
        }
    }

    /// Create a remote whose ping() always fails.
    pub fn unreachable() -> Self {
        let remote = Self::new();
        remote.set_reachable(false);
        remote
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Seed a document. `doc` must be a JSON object carrying `_id`.
    pub async fn insert(&self, table: &str, doc: Value) {
        let doc = doc.as_object().cloned().expect("document must be an object");
        self.documents
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .push(doc);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_ping_delay(&self, delay: Duration) {
        *self.ping_delay.lock().unwrap() = Some(delay);
    }

    /// Make ping() wait until the returned gate is notified.
    pub fn gate_ping(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.ping_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Make every call against `table` fail.
    pub fn fail_table(&self, table: &str) {
        self.failing_tables.lock().unwrap().insert(table.to_string());
    }

    /// Make find_all() on `table` panic.
    pub fn panic_on_pull(&self, table: &str) {
        *self.panic_table.lock().unwrap() = Some(table.to_string());
    }

    /// Configure upsert() to fail after N successful calls.
    pub fn fail_after(&self, n: usize) {
        self.fail_after_upserts.store(n, Ordering::SeqCst);
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    /// Get all recorded upsert() calls.
    pub async fn upserted(&self) -> Vec<UpsertCall> {
        self.upserts.read().await.clone()
    }

    /// Get all recorded delete() calls.
    pub async fn deleted(&self) -> Vec<DeleteCall> {
        self.deletes.read().await.clone()
    }

    /// Current documents of `table`.
    pub async fn documents(&self, table: &str) -> Vec<Record> {
        self.documents
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn check_table(&self, table: &str, operation: &str) -> RemoteResult<()> {
        if self.failing_tables.lock().unwrap().contains(table) {
            return Err(RemoteError(format!("simulated {} failure on {}", operation, table)));
        }
        Ok(())
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MockRemote {
    fn ping(&self) -> BoxFuture<'_, RemoteResult<()>> {
        let delay = *self.ping_delay.lock().unwrap();
        let gate = self.ping_gate.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(RemoteError("connection refused".to_string()))
            }
        })
    }

    fn find_all(&self, table: &str) -> BoxFuture<'_, RemoteResult<Vec<Record>>> {
        let table = table.to_string();
        Box::pin(async move {
            if self.panic_table.lock().unwrap().as_deref() == Some(table.as_str()) {
                panic!("simulated panic pulling {}", table);
            }
            self.check_table(&table, "find_all")?;
            Ok(self.documents(&table).await)
        })
    }

    fn upsert(&self, table: &str, document: Record) -> BoxFuture<'_, RemoteResult<String>> {
        let table = table.to_string();
        Box::pin(async move {
            self.check_table(&table, "upsert")?;

            // Check if we should fail
            let count = self.upsert_count.fetch_add(1, Ordering::SeqCst);
            if count >= self.fail_after_upserts.load(Ordering::SeqCst) {
                return Err(RemoteError("Simulated failure".to_string()));
            }

            let key = match document.get("_id").and_then(Value::as_str) {
                Some(key) => key.to_string(),
                None => format!("remote-{}", self.next_key.fetch_add(1, Ordering::SeqCst)),
            };
            let mut stored = document.clone();
            stored.insert("_id".to_string(), Value::String(key.clone()));

            {
                let mut documents = self.documents.write().await;
                let docs = documents.entry(table.clone()).or_default();
                match docs
                    .iter_mut()
                    .find(|doc| doc.get("_id").and_then(Value::as_str) == Some(key.as_str()))
                {
                    Some(existing) => *existing = stored,
                    None => docs.push(stored),
                }
            }

            // Record the call
            self.upserts.write().await.push(UpsertCall {
                table,
                document,
                key: key.clone(),
            });
            Ok(key)
        })
    }

    fn delete(&self, table: &str, key: &str) -> BoxFuture<'_, RemoteResult<bool>> {
        let table = table.to_string();
        let key = key.to_string();
        Box::pin(async move {
            self.check_table(&table, "delete")?;

            let existed = {
                let mut documents = self.documents.write().await;
                let docs = documents.entry(table.clone()).or_default();
                let before = docs.len();
                docs.retain(|doc| doc.get("_id").and_then(Value::as_str) != Some(key.as_str()));
                docs.len() != before
            };

            self.deletes.write().await.push(DeleteCall { table, key });
            Ok(existed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_upsert_assigns_and_reuses_keys() {
        let remote = MockRemote::new();

        let mut doc = Record::new();
        doc.insert("name".to_string(), json!("Acme"));
        let key = remote.upsert("clients", doc).await.unwrap();
        assert_eq!(key, "remote-1");

        let mut again = Record::new();
        again.insert("_id".to_string(), json!(key.clone()));
        again.insert("name".to_string(), json!("Acme Ltd"));
        assert_eq!(remote.upsert("clients", again).await.unwrap(), key);

        let docs = remote.documents("clients").await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["name"], json!("Acme Ltd"));
        assert_eq!(remote.upserted().await.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let remote = MockRemote::unreachable();
        assert!(remote.ping().await.is_err());

        remote.fail_table("invoices");
        assert!(remote.find_all("invoices").await.is_err());
        assert!(remote.find_all("clients").await.unwrap().is_empty());

        remote.fail_after(0);
        assert!(remote.upsert("clients", Record::new()).await.is_err());
    }
}
