//! Persistence port for the offline queue.
//!
//! The queue is stored as one named record holding the whole ordered
//! sequence (`{ "offlineQueue": [...] }`). Every mutation rewrites the
//! record, so an implementation only needs `load` and `save`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::QueuedOrder;

/// Name of the durable record holding the queue.
pub const QUEUE_RECORD: &str = "kade-offline-storage";

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQueue {
    pub offline_queue: Vec<QueuedOrder>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage write failed: {0}")]
    Write(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Durable home of the offline queue.
#[async_trait]
pub trait QueueStorage: Send + Sync {
    /// Read the persisted queue; `None` when nothing was ever saved.
    async fn load(&self) -> Result<Option<PersistedQueue>, StorageError>;

    /// Replace the persisted queue.
    async fn save(&self, state: &PersistedQueue) -> Result<(), StorageError>;
}

/// In-memory storage for tests/dev.
///
/// Can be told to fail upcoming writes to exercise persistence failures.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    record: Mutex<Option<PersistedQueue>>,
    failing_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an already persisted queue (simulates a restart).
    pub fn with_queue(orders: Vec<QueuedOrder>) -> Self {
        let storage = Self::new();
        if let Ok(mut record) = storage.record.lock() {
            *record = Some(PersistedQueue {
                offline_queue: orders,
            });
        }
        storage
    }

    /// Make the next `n` saves fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of what is currently persisted.
    pub fn persisted(&self) -> Option<PersistedQueue> {
        self.record.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl QueueStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<PersistedQueue>, StorageError> {
        let record = self
            .record
            .lock()
            .map_err(|_| StorageError::Unavailable("lock poisoned".into()))?;
        Ok(record.clone())
    }

    async fn save(&self, state: &PersistedQueue) -> Result<(), StorageError> {
        let pending_failures = self.failing_writes.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_writes.store(pending_failures - 1, Ordering::SeqCst);
            return Err(StorageError::Write("injected failure".into()));
        }

        let mut record = self
            .record
            .lock()
            .map_err(|_| StorageError::Unavailable("lock poisoned".into()))?;
        *record = Some(state.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
