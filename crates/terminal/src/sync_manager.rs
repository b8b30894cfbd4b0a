//! Queue synchronizer: replays offline orders against the remote API.
//!
//! This module provides a `QueueSynchronizer` that:
//! - Runs at most one drain pass at a time (`SyncPhase::Idle` / `Draining`)
//! - Replays queued orders strictly in enqueue order, one request at a time
//! - Removes an order only after both its header and its items were created
//! - Stops at the first failure, leaving that order and all later ones queued
//! - Throttles queue-change retries after a failed pass
//!
//! No idempotency key is sent: if the process dies between a remote write
//! and the dequeue, the retry creates the order again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use kade_sales::OrderStatus;

use crate::notice::{Notice, Notifier};
use crate::offline::ConnectivityMonitor;
use crate::offline_queue::OfflineQueue;
use crate::remote::{NewOrder, NewOrderItem, OrderApi};
use crate::types::{FailedStage, QueuedOrder, SkipReason, SyncFailure, SyncOutcome, SyncReport, SyncTrigger};

/// Drain state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Draining { trigger: SyncTrigger },
}

/// Returns the phase to `Idle` however the pass ends.
struct DrainGuard<'a> {
    phase: &'a Mutex<SyncPhase>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        match self.phase.lock() {
            Ok(mut phase) => *phase = SyncPhase::Idle,
            Err(poisoned) => *poisoned.into_inner() = SyncPhase::Idle,
        }
    }
}

pub struct QueueSynchronizer {
    queue: Arc<OfflineQueue>,
    api: Arc<dyn OrderApi>,
    connectivity: Arc<ConnectivityMonitor>,
    notifier: Notifier,
    phase: Mutex<SyncPhase>,
    last_failure: Mutex<Option<Instant>>,
    min_retry_interval: Duration,
}

impl std::fmt::Debug for QueueSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSynchronizer")
            .field("phase", &self.phase())
            .field("min_retry_interval", &self.min_retry_interval)
            .finish_non_exhaustive()
    }
}

impl QueueSynchronizer {
    pub fn new(
        queue: Arc<OfflineQueue>,
        api: Arc<dyn OrderApi>,
        connectivity: Arc<ConnectivityMonitor>,
        notifier: Notifier,
    ) -> Self {
        Self {
            queue,
            api,
            connectivity,
            notifier,
            phase: Mutex::new(SyncPhase::Idle),
            last_failure: Mutex::new(None),
            min_retry_interval: Duration::ZERO,
        }
    }

    /// Minimum gap between a failed pass and the next queue-change retry.
    pub fn with_min_retry_interval(mut self, interval: Duration) -> Self {
        self.min_retry_interval = interval;
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase.lock().map(|p| *p).unwrap_or(SyncPhase::Idle)
    }

    pub fn is_draining(&self) -> bool {
        matches!(self.phase(), SyncPhase::Draining { .. })
    }

    /// Time left before a throttled retry is allowed, if any.
    pub fn retry_due_in(&self) -> Option<Duration> {
        let failed_at = self.last_failure.lock().ok().and_then(|f| *f)?;
        let elapsed = failed_at.elapsed();
        (elapsed < self.min_retry_interval).then(|| self.min_retry_interval - elapsed)
    }

    /// Run one drain pass, unless one is already running, the queue is
    /// empty, the terminal is offline, or (for queue-change triggers) the
    /// retry interval has not elapsed.
    pub async fn drain(&self, trigger: SyncTrigger) -> SyncOutcome {
        let _guard = match self.begin(trigger) {
            Ok(guard) => guard,
            Err(reason) => {
                tracing::debug!(?trigger, ?reason, "drain skipped");
                return SyncOutcome::Skipped { reason };
            }
        };

        let snapshot = self.queue.list().await;
        tracing::info!(?trigger, pending = snapshot.len(), "syncing offline orders");

        let mut synced = Vec::new();
        let mut stopped_on = None;

        for order in &snapshot {
            match self.replay(order).await {
                Ok(()) => {
                    synced.push(order.queued_at);
                    if let Err(err) = self.queue.dequeue(order.queued_at).await {
                        tracing::error!(
                            queued_at = %order.queued_at,
                            error = %err,
                            "order synced but queue removal was not persisted"
                        );
                        self.notifier.emit(Notice::PersistenceFailed {
                            detail: err.to_string(),
                        });
                    }
                }
                Err(failure) => {
                    stopped_on = Some(failure);
                    break;
                }
            }
        }

        self.record_pass(stopped_on.is_some());

        let report = SyncReport {
            trigger,
            synced,
            remaining: self.queue.len(),
            stopped_on,
        };

        tracing::info!(
            synced = report.synced_count(),
            remaining = report.remaining,
            failed = report.stopped_on.is_some(),
            "sync pass finished"
        );

        if report.synced_count() > 0 {
            self.notifier.emit(Notice::Synced {
                count: report.synced_count(),
            });
        }

        SyncOutcome::Completed(report)
    }

    fn begin(&self, trigger: SyncTrigger) -> Result<DrainGuard<'_>, SkipReason> {
        let mut phase = self
            .phase
            .lock()
            .map_err(|_| SkipReason::AlreadyDraining)?;

        if matches!(*phase, SyncPhase::Draining { .. }) {
            return Err(SkipReason::AlreadyDraining);
        }
        if !self.connectivity.is_online() {
            return Err(SkipReason::Offline);
        }
        if self.queue.is_empty() {
            return Err(SkipReason::QueueEmpty);
        }
        if trigger == SyncTrigger::QueueNonEmptyWhileOnline && self.retry_due_in().is_some() {
            return Err(SkipReason::CoolingDown);
        }

        *phase = SyncPhase::Draining { trigger };
        Ok(DrainGuard { phase: &self.phase })
    }

    /// Create the order, then its items. Both must succeed.
    async fn replay(&self, order: &QueuedOrder) -> Result<(), SyncFailure> {
        let header = NewOrder {
            total_amount: order.total_amount,
            status: OrderStatus::Pending,
            created_at: order.created_at,
        };

        let created = self.api.create_order(&header).await.map_err(|err| {
            tracing::warn!(
                queued_at = %order.queued_at,
                error = %err,
                "failed to create order; leaving it queued"
            );
            SyncFailure {
                queued_at: order.queued_at,
                stage: FailedStage::CreateOrder,
                error: err.to_string(),
            }
        })?;

        let items = NewOrderItem::for_lines(created.id, &order.items);
        self.api.create_order_items(&items).await.map_err(|err| {
            tracing::warn!(
                queued_at = %order.queued_at,
                order_id = %created.id,
                error = %err,
                "failed to create order items; remote order left without items"
            );
            SyncFailure {
                queued_at: order.queued_at,
                stage: FailedStage::CreateItems {
                    orphaned_order: created.id,
                },
                error: err.to_string(),
            }
        })?;

        tracing::debug!(queued_at = %order.queued_at, order_id = %created.id, "order synced");
        Ok(())
    }

    fn record_pass(&self, failed: bool) {
        if let Ok(mut last) = self.last_failure.lock() {
            *last = failed.then(Instant::now);
        }
    }
}
