//! Best-effort storage of merged results.
//!
//! Search never waits on storage: batches go onto a bounded queue drained by
//! a single background task. A full queue or a failed write is logged and
//! counted, never reported to the caller.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::{CanonicalResult, PersistenceStats};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    /// Query text that produced this result
    pub query: String,
    pub result: CanonicalResult,
    pub stored_at: DateTime<Utc>,
}

/// Keyed by result id; writing the same id again replaces the row.
pub trait ResultStore: Send + Sync {
    fn upsert(&self, query: &str, results: &[CanonicalResult]) -> Result<usize, StoreError>;
    /// Newest published first.
    fn load_all(&self) -> Result<Vec<StoredResult>, StoreError>;
}

fn stored(query: &str, result: &CanonicalResult, now: DateTime<Utc>) -> StoredResult {
    StoredResult {
        query: query.to_string(),
        result: result.clone(),
        stored_at: now,
    }
}

fn sorted(mut rows: Vec<StoredResult>) -> Vec<StoredResult> {
    rows.sort_by(|a, b| b.result.published_at.cmp(&a.result.published_at));
    rows
}

/// A simple in-memory store, mainly for testing.
pub struct MemoryResultStore {
    map: Mutex<HashMap<String, StoredResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore for MemoryResultStore {
    fn upsert(&self, query: &str, results: &[CanonicalResult]) -> Result<usize, StoreError> {
        let mut map = self
            .map
            .lock()
            .map_err(|e| StoreError::Persist(format!("lock poisoned: {}", e)))?;
        let now = Utc::now();
        for r in results {
            map.insert(r.id.clone(), stored(query, r, now));
        }
        Ok(results.len())
    }

    fn load_all(&self) -> Result<Vec<StoredResult>, StoreError> {
        let map = self
            .map
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))?;
        Ok(sorted(map.values().cloned().collect()))
    }
}

/// JSON file store at `~/.local/share/feedmerge/results.json` (Linux),
/// `~/Library/Application Support/feedmerge/results.json` (macOS)
/// or `%APPDATA%/feedmerge/results.json` (Windows).
pub struct FileResultStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn new_default() -> Self {
        Self::new(Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        let base = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("feedmerge").join("results.json")
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, StoredResult>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) if s.trim().is_empty() => Ok(HashMap::new()),
            Ok(s) => serde_json::from_str(&s)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StoreError::Unavailable(e.to_string())),
        }
    }

    /// Move an unreadable store aside so writes can start over.
    fn quarantine(&self) -> Result<HashMap<String, StoredResult>, StoreError> {
        let aside = self.path.with_extension("json.corrupt");
        std::fs::rename(&self.path, &aside)
            .map_err(|e| StoreError::Persist(format!("quarantine: {}", e)))?;
        warn!(path = %aside.display(), "Result store was corrupt, moved aside");
        Ok(HashMap::new())
    }

    /// Write to a sibling temp file, then rename over the store so readers
    /// never see a partial file.
    fn write_map(&self, map: &HashMap<String, StoredResult>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Persist(e.to_string()))?;
        }
        let s = serde_json::to_string_pretty(map)
            .map_err(|e| StoreError::Persist(format!("serde: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, s).map_err(|e| StoreError::Persist(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&tmp, perms)
                .map_err(|e| StoreError::Persist(format!("chmod: {}", e)))?;
        }

        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Persist(format!("rename: {}", e)))
    }
}

impl ResultStore for FileResultStore {
    fn upsert(&self, query: &str, results: &[CanonicalResult]) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = match self.read_map() {
            Err(StoreError::Corrupt(_)) => self.quarantine()?,
            other => other?,
        };
        let now = Utc::now();
        for r in results {
            map.insert(r.id.clone(), stored(query, r, now));
        }
        self.write_map(&map)?;
        Ok(results.len())
    }

    fn load_all(&self) -> Result<Vec<StoredResult>, StoreError> {
        Ok(sorted(self.read_map()?.into_values().collect()))
    }
}

// ============================================================================
// Background writer
// ============================================================================

struct Batch {
    query: String,
    results: Vec<CanonicalResult>,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

/// Bounded queue plus one consumer task that owns all store writes.
pub struct PersistenceWriter {
    tx: Mutex<Option<mpsc::Sender<Batch>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl PersistenceWriter {
    /// Start the consumer. Must be called from within a Tokio runtime.
    pub fn spawn(store: Arc<dyn ResultStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let handle = tokio::spawn(consume(rx, store, Arc::clone(&counters)));
        Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            counters,
        }
    }

    /// Enqueue without waiting. Returns whether the batch was accepted.
    pub fn submit(&self, query: &str, results: Vec<CanonicalResult>) -> bool {
        if results.is_empty() {
            return true;
        }
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            warn!("Persistence writer is shut down, dropping results");
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let count = results.len();
        match tx.try_send(Batch {
            query: query.to_string(),
            results,
        }) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(count, "Persistence queue full, dropping results");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(count, "Persistence consumer stopped, dropping results");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> PersistenceStats {
        PersistenceStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting batches and wait until queued ones are written.
    pub async fn shutdown(&self) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(tx);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Persistence consumer ended abnormally");
            }
        }
    }
}

async fn consume(mut rx: mpsc::Receiver<Batch>, store: Arc<dyn ResultStore>, counters: Arc<Counters>) {
    while let Some(batch) = rx.recv().await {
        let store = Arc::clone(&store);
        let count = batch.results.len();
        let outcome = tokio::task::spawn_blocking(move || store.upsert(&batch.query, &batch.results)).await;
        match outcome {
            Ok(Ok(written)) => {
                counters.written.fetch_add(written as u64, Ordering::Relaxed);
                debug!(count = written, "Persisted results");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(count, error = %e, "Failed to persist results");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(count, error = %e, "Persistence task panicked");
            }
        }
    }
    debug!("Persistence writer stopped");
}
