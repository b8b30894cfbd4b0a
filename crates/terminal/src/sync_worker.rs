//! Background worker that turns connectivity and queue events into drain
//! passes.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::offline::{ConnectivityEvent, ConnectivityMonitor};
use crate::offline_queue::OfflineQueue;
use crate::sync_manager::QueueSynchronizer;
use crate::types::{SyncOutcome, SyncTrigger};

/// Background sync worker.
pub struct SyncWorker {
    sync: Arc<QueueSynchronizer>,
    connectivity: Arc<ConnectivityMonitor>,
    queue: Arc<OfflineQueue>,
}

/// Handle to a running worker.
#[derive(Debug)]
pub struct SyncWorkerHandle {
    join: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl SyncWorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop. A drain
    /// pass in flight is allowed to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            tracing::error!("sync worker task failed: {err}");
        }
    }
}

impl SyncWorker {
    pub fn new(
        sync: Arc<QueueSynchronizer>,
        connectivity: Arc<ConnectivityMonitor>,
        queue: Arc<OfflineQueue>,
    ) -> Self {
        Self {
            sync,
            connectivity,
            queue,
        }
    }

    /// Start the background sync worker.
    ///
    /// This spawns a task that:
    /// - Drains once at startup if the terminal is online with a backlog
    /// - Drains on every offline → online transition
    /// - Drains whenever the queue changes while online and non-empty
    /// - Retries when the synchronizer's retry interval runs out
    pub fn start(self) -> SyncWorkerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        // Subscribe before spawning so no transition is missed.
        let mut connectivity = self.connectivity.subscribe();
        let mut pending = self.queue.subscribe();

        let join = tokio::spawn(async move {
            tracing::info!("background sync worker started");

            if self.connectivity.is_online() && !self.queue.is_empty() {
                self.run(SyncTrigger::QueueNonEmptyWhileOnline).await;
            }

            loop {
                let retry_in = self.sync.retry_due_in();

                tokio::select! {
                    _ = signal.notified() => {
                        tracing::info!("background sync worker received shutdown signal");
                        break;
                    }
                    event = connectivity.next() => match event {
                        Some(ConnectivityEvent::Restored) => {
                            self.run(SyncTrigger::ConnectivityRestored).await;
                        }
                        Some(ConnectivityEvent::Lost) => {
                            tracing::debug!("offline; sync suspended");
                        }
                        None => break,
                    },
                    changed = pending.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let count = *pending.borrow_and_update();
                        if count > 0 && self.connectivity.is_online() {
                            self.run(SyncTrigger::QueueNonEmptyWhileOnline).await;
                        }
                    }
                    _ = tokio::time::sleep(retry_in.unwrap_or_default()), if retry_in.is_some() => {
                        if self.connectivity.is_online() && !self.queue.is_empty() {
                            self.run(SyncTrigger::QueueNonEmptyWhileOnline).await;
                        }
                    }
                }
            }

            tracing::info!("background sync worker stopped");
        });

        SyncWorkerHandle { join, shutdown }
    }

    async fn run(&self, trigger: SyncTrigger) {
        match self.sync.drain(trigger).await {
            SyncOutcome::Completed(report) => {
                if let Some(failure) = report.stopped_on {
                    tracing::warn!(
                        remaining = report.remaining,
                        queued_at = %failure.queued_at,
                        "sync pass stopped early; will retry"
                    );
                }
            }
            SyncOutcome::Skipped { reason } => {
                tracing::debug!(?trigger, ?reason, "sync not run");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use kade_core::{Money, ProductId};
    use kade_sales::OrderLine;

    use crate::notice::{Notice, Notifier};
    use crate::remote::InMemoryOrderApi;
    use crate::storage::MemoryStorage;
    use crate::types::{ConnectivityState, PendingOrder};

    fn order() -> PendingOrder {
        PendingOrder::from_lines(
            vec![OrderLine::new(ProductId::new(1), "Rice", Money::from_units(100), 2)],
            Utc::now(),
        )
        .unwrap()
    }

    async fn wait_for_synced(rx: &mut tokio::sync::broadcast::Receiver<Notice>) -> usize {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                if let Ok(Notice::Synced { count }) = rx.recv().await {
                    return count;
                }
            }
        })
        .await
        .expect("no sync notice")
    }

    #[tokio::test]
    async fn drains_on_reconnect_and_on_new_orders() {
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let queue = Arc::new(OfflineQueue::open(Arc::new(MemoryStorage::new())).await.unwrap());
        let api = Arc::new(InMemoryOrderApi::new());
        let monitor = Arc::new(ConnectivityMonitor::new(ConnectivityState::Offline, notifier.clone()));
        let sync = Arc::new(QueueSynchronizer::new(
            queue.clone(),
            api.clone(),
            monitor.clone(),
            notifier.clone(),
        ));

        let handle = SyncWorker::new(sync, monitor.clone(), queue.clone()).start();

        queue.enqueue(order()).await.unwrap();
        queue.enqueue(order()).await.unwrap();
        monitor.set_online();
        assert_eq!(wait_for_synced(&mut notices).await, 2);
        assert!(queue.is_empty());

        queue.enqueue(order()).await.unwrap();
        assert_eq!(wait_for_synced(&mut notices).await, 1);
        assert_eq!(api.orders().len(), 3);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn drains_backlog_at_startup_when_online() {
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let storage = Arc::new(MemoryStorage::new());
        {
            let queue = OfflineQueue::open(storage.clone()).await.unwrap();
            queue.enqueue(order()).await.unwrap();
        }

        let queue = Arc::new(OfflineQueue::open(storage).await.unwrap());
        let api = Arc::new(InMemoryOrderApi::new());
        let monitor = Arc::new(ConnectivityMonitor::new(ConnectivityState::Online, notifier.clone()));
        let sync = Arc::new(QueueSynchronizer::new(queue.clone(), api, monitor.clone(), notifier));

        let handle = SyncWorker::new(sync, monitor, queue.clone()).start();
        assert_eq!(wait_for_synced(&mut notices).await, 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retries_when_cooldown_expires() {
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let queue = Arc::new(OfflineQueue::open(Arc::new(MemoryStorage::new())).await.unwrap());
        queue.enqueue(order()).await.unwrap();

        let api = Arc::new(InMemoryOrderApi::new());
        api.fail_create_order_at(1);
        let monitor = Arc::new(ConnectivityMonitor::new(ConnectivityState::Online, notifier.clone()));
        let sync = Arc::new(
            QueueSynchronizer::new(queue.clone(), api.clone(), monitor.clone(), notifier)
                .with_min_retry_interval(Duration::from_secs(5)),
        );

        let started = tokio::time::Instant::now();
        let handle = SyncWorker::new(sync, monitor, queue.clone()).start();

        // Nothing else changes: only the cooldown timer can trigger the retry.
        assert_eq!(wait_for_synced(&mut notices).await, 1);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(queue.is_empty());
        assert_eq!(api.calls().len(), 3);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_worker() {
        let notifier = Notifier::new();
        let queue = Arc::new(OfflineQueue::open(Arc::new(MemoryStorage::new())).await.unwrap());
        let monitor = Arc::new(ConnectivityMonitor::new(ConnectivityState::Online, notifier.clone()));
        let sync = Arc::new(QueueSynchronizer::new(
            queue.clone(),
            Arc::new(InMemoryOrderApi::new()),
            monitor.clone(),
            notifier,
        ));

        let handle = SyncWorker::new(sync, monitor.clone(), queue).start();
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("worker did not stop");
        assert_eq!(monitor.subscriber_count(), 0);
    }
}
