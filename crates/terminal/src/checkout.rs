//! Counter checkout: turns the cart into a remote order when online, or a
//! queued order with a temporary receipt when offline.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use kade_core::{DomainError, OrderId};
use kade_sales::{Cart, MenuItem, OrderStatus, Receipt, ReceiptRef, sort_for_display};

use crate::cache::LocalStore;
use crate::notice::{Notice, Notifier};
use crate::offline::ConnectivityMonitor;
use crate::offline_queue::{EnqueueError, OfflineQueue, PersistenceError};
use crate::remote::{NewOrder, NewOrderItem, OrderApi, RemoteError};
use crate::types::{FailedStage, PendingOrder, QueueKey};

/// Where a checked-out order went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Placed { order_id: OrderId },
    Queued { queued_at: QueueKey },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReceipt {
    pub outcome: CheckoutOutcome,
    pub receipt: Receipt,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    /// Online write failed. Nothing was queued and the cart is untouched.
    #[error("order not placed ({stage:?}): {source}")]
    Remote {
        stage: FailedStage,
        #[source]
        source: RemoteError,
    },

    /// The order is queued, but only in memory.
    #[error("order {queued_at} queued but not saved to disk: {source}")]
    NotPersisted {
        queued_at: QueueKey,
        receipt: Box<Receipt>,
        #[source]
        source: PersistenceError,
    },
}

/// Checkout entry point shared by the terminal front-ends.
#[derive(Clone)]
pub struct CheckoutService {
    queue: Arc<OfflineQueue>,
    api: Arc<dyn OrderApi>,
    connectivity: Arc<ConnectivityMonitor>,
    notifier: Notifier,
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService")
            .field("queue", &self.queue)
            .field("connectivity", &self.connectivity.state())
            .finish_non_exhaustive()
    }
}

impl CheckoutService {
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
        }
    }

    /// Check out `cart`. On success the cart is cleared.
    pub async fn checkout(&self, cart: &mut Cart) -> Result<CheckoutReceipt, CheckoutError> {
        if cart.is_empty() {
            return Err(DomainError::validation("cart is empty").into());
        }

        let now = Utc::now();
        let result = if self.connectivity.is_online() {
            self.place(cart, now).await
        } else {
            self.enqueue(cart, now).await
        };

        // A queued-but-unsaved order is still queued; the cart must not be
        // rung up twice.
        if matches!(result, Ok(_) | Err(CheckoutError::NotPersisted { .. })) {
            cart.clear();
        }
        result
    }

    async fn place(&self, cart: &Cart, now: DateTime<Utc>) -> Result<CheckoutReceipt, CheckoutError> {
        let lines = cart.lines().to_vec();
        let order = NewOrder {
            total_amount: cart.total()?,
            status: OrderStatus::Pending,
            created_at: now,
        };

        let created = self.api.create_order(&order).await.map_err(|source| {
            tracing::warn!(error = %source, "failed to place order");
            CheckoutError::Remote {
                stage: FailedStage::CreateOrder,
                source,
            }
        })?;

        let items = NewOrderItem::for_lines(created.id, &lines);
        self.api.create_order_items(&items).await.map_err(|source| {
            tracing::warn!(order_id = %created.id, error = %source, "order placed without items");
            CheckoutError::Remote {
                stage: FailedStage::CreateItems {
                    orphaned_order: created.id,
                },
                source,
            }
        })?;

        tracing::info!(order_id = %created.id, total = %order.total_amount, "order placed");
        let reference = ReceiptRef::Order(created.id);
        self.notifier.emit(Notice::OrderPlaced {
            reference: reference.to_string(),
        });

        Ok(CheckoutReceipt {
            outcome: CheckoutOutcome::Placed {
                order_id: created.id,
            },
            receipt: Receipt::new(reference, now, lines)?,
        })
    }

    async fn enqueue(&self, cart: &Cart, now: DateTime<Utc>) -> Result<CheckoutReceipt, CheckoutError> {
        let lines = cart.lines().to_vec();
        let receipt = Receipt::new(ReceiptRef::offline_at(now), now, lines.clone())?;
        let pending = PendingOrder::from_lines(lines, now)?;

        match self.queue.enqueue(pending).await {
            Ok(queued) => {
                self.notifier.emit(Notice::OrderQueued {
                    pending: self.queue.len(),
                });
                Ok(CheckoutReceipt {
                    outcome: CheckoutOutcome::Queued {
                        queued_at: queued.queued_at,
                    },
                    receipt,
                })
            }
            Err(EnqueueError::Invalid(err)) => Err(err.into()),
            Err(EnqueueError::NotPersisted { order, source }) => {
                tracing::error!(queued_at = %order.queued_at, error = %source, "queued order not persisted");
                self.notifier.emit(Notice::PersistenceFailed {
                    detail: source.to_string(),
                });
                Err(CheckoutError::NotPersisted {
                    queued_at: order.queued_at,
                    receipt: Box::new(receipt),
                    source,
                })
            }
        }
    }
}

/// Where the menu on screen came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuSource {
    Live,
    Cached { cached_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedMenu {
    pub items: Vec<MenuItem>,
    pub source: MenuSource,
}

/// Settle the menu from a fetch attempt: a fresh menu is cached, a failed
/// fetch falls back to the last cached copy.
pub async fn resolve_menu(
    store: &LocalStore,
    fetched: Result<Vec<MenuItem>, RemoteError>,
) -> anyhow::Result<LoadedMenu> {
    match fetched {
        Ok(mut items) => {
            sort_for_display(&mut items);
            if let Err(err) = store.cache_menu(&items).await {
                tracing::warn!("failed to cache menu: {err:#}");
            }
            Ok(LoadedMenu {
                items,
                source: MenuSource::Live,
            })
        }
        Err(fetch_err) => {
            tracing::warn!(error = %fetch_err, "menu fetch failed; using cached menu");
            match store.cached_menu().await? {
                Some(cached) => Ok(LoadedMenu {
                    items: cached.items,
                    source: MenuSource::Cached {
                        cached_at: cached.cached_at,
                    },
                }),
                None => Err(anyhow::anyhow!("menu unavailable and nothing cached: {fetch_err}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kade_core::{Money, ProductId};
    use kade_sales::MenuCategory;

    use crate::remote::{ApiCall, InMemoryOrderApi};
    use crate::storage::MemoryStorage;
    use crate::types::ConnectivityState;

    struct Harness {
        service: CheckoutService,
        queue: Arc<OfflineQueue>,
        api: Arc<InMemoryOrderApi>,
        storage: Arc<MemoryStorage>,
        notifier: Notifier,
    }

    async fn harness(state: ConnectivityState) -> Harness {
        let notifier = Notifier::new();
        let storage = Arc::new(MemoryStorage::new());
        let queue = Arc::new(
            OfflineQueue::open(storage.clone())
                .await
                .unwrap()
                .with_retry(crate::offline_queue::PersistRetry {
                    attempts: 1,
                    delay: std::time::Duration::ZERO,
                }),
        );
        let api = Arc::new(InMemoryOrderApi::new());
        let monitor = Arc::new(ConnectivityMonitor::new(state, notifier.clone()));
        let service = CheckoutService::new(queue.clone(), api.clone(), monitor, notifier.clone());
        Harness {
            service,
            queue,
            api,
            storage,
            notifier,
        }
    }

    fn rice() -> MenuItem {
        MenuItem {
            id: ProductId::new(1),
            name: "Rice".to_string(),
            price: Money::from_units(100),
            category: MenuCategory::Base,
            is_available: true,
        }
    }

    fn cart_with_rice(qty: u32) -> Cart {
        let mut cart = Cart::new();
        for _ in 0..qty {
            cart.add(&rice()).unwrap();
        }
        cart
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let h = harness(ConnectivityState::Online).await;
        let err = h.service.checkout(&mut Cart::new()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Invalid(DomainError::Validation(_))));
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn offline_checkout_queues_with_temporary_receipt() {
        let h = harness(ConnectivityState::Offline).await;
        let mut notices = h.notifier.subscribe();
        let mut cart = cart_with_rice(2);

        let done = h.service.checkout(&mut cart).await.unwrap();

        assert!(matches!(done.outcome, CheckoutOutcome::Queued { .. }));
        assert!(matches!(&done.receipt.reference, ReceiptRef::Offline(r) if r.starts_with("OFF-")));
        assert_eq!(done.receipt.total, Money::from_units(200));
        assert!(cart.is_empty());
        assert!(h.api.calls().is_empty());

        let queued = h.queue.list().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].total_amount, Money::from_units(200));
        assert_eq!(notices.recv().await.unwrap(), Notice::OrderQueued { pending: 1 });
    }

    #[tokio::test]
    async fn online_checkout_writes_order_then_items() {
        let h = harness(ConnectivityState::Online).await;
        let mut cart = cart_with_rice(2);

        let done = h.service.checkout(&mut cart).await.unwrap();

        assert_eq!(
            done.outcome,
            CheckoutOutcome::Placed {
                order_id: OrderId::new(1)
            }
        );
        assert_eq!(done.receipt.reference, ReceiptRef::Order(OrderId::new(1)));
        assert!(matches!(
            h.api.calls().as_slice(),
            [ApiCall::CreateOrder(_), ApiCall::CreateItems(items)] if items.len() == 1
        ));
        assert_eq!(h.api.orders()[0].1.status, OrderStatus::Pending);
        assert_eq!(h.api.items()[0].quantity, 2);
        assert!(cart.is_empty());
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn online_failure_keeps_cart_and_queues_nothing() {
        let h = harness(ConnectivityState::Online).await;
        h.api.fail_create_order_at(1);
        let mut cart = cart_with_rice(1);

        let err = h.service.checkout(&mut cart).await.unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::Remote {
                stage: FailedStage::CreateOrder,
                ..
            }
        ));
        assert_eq!(cart.unit_count(), 1);
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn unsaved_queue_write_is_reported_but_order_stays_queued() {
        let h = harness(ConnectivityState::Offline).await;
        h.storage.fail_next_writes(1);
        let mut cart = cart_with_rice(1);

        let err = h.service.checkout(&mut cart).await.unwrap_err();

        assert!(matches!(err, CheckoutError::NotPersisted { .. }));
        assert_eq!(h.queue.len(), 1);
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn menu_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("kade.db")).await.unwrap();

        let live = resolve_menu(&store, Ok(vec![rice()])).await.unwrap();
        assert_eq!(live.source, MenuSource::Live);

        let offline = resolve_menu(&store, Err(RemoteError::Network("down".into())))
            .await
            .unwrap();
        assert!(matches!(offline.source, MenuSource::Cached { .. }));
        assert_eq!(offline.items, vec![rice()]);
    }

    #[tokio::test]
    async fn menu_without_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("kade.db")).await.unwrap();
        assert!(
            resolve_menu(&store, Err(RemoteError::Network("down".into())))
                .await
                .is_err()
        );
    }
}
