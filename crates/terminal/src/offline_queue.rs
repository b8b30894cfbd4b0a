//! Durable FIFO queue of orders taken while offline.
//!
//! The queue keeps its authoritative copy in memory and writes the whole
//! sequence through to a [`QueueStorage`] on every mutation, while still
//! holding the queue lock, so the persisted order always matches memory.
//! A failed write is retried a few times; if it keeps failing the mutation
//! still stands in memory and the caller gets a [`PersistenceError`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, watch};

use kade_core::DomainError;

use crate::storage::{PersistedQueue, QueueStorage, StorageError};
use crate::types::{PendingOrder, QueueKey, QueuedOrder};

/// How hard to try before reporting a persistence failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for PersistRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(50),
        }
    }
}

/// The queue changed in memory but could not be written to storage.
#[derive(Debug, Clone, thiserror::Error)]
#[error("offline queue not persisted after {attempts} attempt(s): {source}")]
pub struct PersistenceError {
    pub attempts: u32,
    #[source]
    pub source: StorageError,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EnqueueError {
    /// Rejected; nothing was queued.
    #[error("order rejected: {0}")]
    Invalid(#[from] DomainError),

    /// Queued for this session only.
    #[error("order {} queued in memory only: {source}", .order.queued_at)]
    NotPersisted {
        order: QueuedOrder,
        #[source]
        source: PersistenceError,
    },
}

#[derive(Debug, Default)]
struct QueueInner {
    orders: Vec<QueuedOrder>,
    last_key: Option<QueueKey>,
}

impl QueueInner {
    /// Next key: `now`, bumped past the previous key when the clock has not
    /// moved (or went backwards).
    fn next_key(&mut self, now: DateTime<Utc>) -> QueueKey {
        let at = match self.last_key {
            Some(last) if now <= last.at() => last.at() + TimeDelta::microseconds(1),
            _ => now,
        };
        let key = QueueKey::new(at);
        self.last_key = Some(key);
        key
    }

    fn snapshot(&self) -> PersistedQueue {
        PersistedQueue {
            offline_queue: self.orders.clone(),
        }
    }
}

/// Offline order queue with write-through persistence.
pub struct OfflineQueue {
    inner: Mutex<QueueInner>,
    storage: Arc<dyn QueueStorage>,
    pending: watch::Sender<usize>,
    retry: PersistRetry,
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("pending", &*self.pending.borrow())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl OfflineQueue {
    /// Load the persisted queue from `storage`.
    pub async fn open(storage: Arc<dyn QueueStorage>) -> Result<Self, StorageError> {
        let orders = storage
            .load()
            .await?
            .map(|persisted| persisted.offline_queue)
            .unwrap_or_default();

        let last_key = orders.iter().map(|o| o.queued_at).max();
        let (pending, _) = watch::channel(orders.len());

        if !orders.is_empty() {
            tracing::info!(pending = orders.len(), "restored offline queue");
        }

        Ok(Self {
            inner: Mutex::new(QueueInner { orders, last_key }),
            storage,
            pending,
            retry: PersistRetry::default(),
        })
    }

    pub fn with_retry(mut self, retry: PersistRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Append an order, assigning it a fresh key.
    pub async fn enqueue(&self, order: PendingOrder) -> Result<QueuedOrder, EnqueueError> {
        order.validate()?;

        let mut inner = self.inner.lock().await;
        let key = inner.next_key(Utc::now());
        let queued = QueuedOrder::from_pending(order, key);
        inner.orders.push(queued.clone());
        self.pending.send_replace(inner.orders.len());

        tracing::info!(
            queued_at = %key,
            total = %queued.total_amount,
            pending = inner.orders.len(),
            "order queued offline"
        );

        match self.persist(&inner).await {
            Ok(()) => Ok(queued),
            Err(source) => Err(EnqueueError::NotPersisted {
                order: queued,
                source,
            }),
        }
    }

    /// Remove the order with `key`. Absent keys are a no-op and do not touch
    /// storage.
    pub async fn dequeue(&self, key: QueueKey) -> Result<Option<QueuedOrder>, PersistenceError> {
        let mut inner = self.inner.lock().await;
        let Some(pos) = inner.orders.iter().position(|o| o.queued_at == key) else {
            tracing::debug!(queued_at = %key, "dequeue of unknown key ignored");
            return Ok(None);
        };

        let removed = inner.orders.remove(pos);
        self.pending.send_replace(inner.orders.len());
        self.persist(&inner).await?;
        Ok(Some(removed))
    }

    /// Drop every queued order.
    pub async fn clear(&self) -> Result<usize, PersistenceError> {
        let mut inner = self.inner.lock().await;
        let dropped = inner.orders.len();
        inner.orders.clear();
        self.pending.send_replace(0);

        if dropped > 0 {
            tracing::warn!(dropped, "offline queue cleared");
        }
        self.persist(&inner).await?;
        Ok(dropped)
    }

    /// Current queue, oldest first.
    pub async fn list(&self) -> Vec<QueuedOrder> {
        self.inner.lock().await.orders.clone()
    }

    /// Pending count as of the last mutation (does not wait for the lock).
    pub fn len(&self) -> usize {
        *self.pending.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change feed carrying the pending count after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.pending.subscribe()
    }

    async fn persist(&self, inner: &QueueInner) -> Result<(), PersistenceError> {
        let snapshot = inner.snapshot();
        let attempts = self.retry.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.storage.save(&snapshot).await {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "offline queue persisted after retry");
                    }
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "failed to persist offline queue");
                    last_error = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        let source = last_error.unwrap_or_else(|| StorageError::Write("no attempt made".into()));
        tracing::error!(attempts, error = %source, "offline queue kept in memory only");
        Err(PersistenceError { attempts, source })
    }
}
