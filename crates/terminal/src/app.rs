//! Wiring for a running terminal: local store, queue, connectivity, remote
//! API, synchronizer and checkout, built once from [`TerminalConfig`].

use std::sync::Arc;

use anyhow::Context;

use kade_sales::ShopInfo;

use crate::cache::LocalStore;
use crate::checkout::{CheckoutService, LoadedMenu, resolve_menu};
use crate::config::TerminalConfig;
use crate::notice::{Notifier, StatusIndicator};
use crate::offline::ConnectivityMonitor;
use crate::offline_queue::OfflineQueue;
use crate::remote::RestOrderApi;
use crate::sync_manager::QueueSynchronizer;
use crate::sync_worker::{SyncWorker, SyncWorkerHandle};
use crate::types::ConnectivityState;

/// Application state shared by the terminal front-end.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: LocalStore,
    pub queue: Arc<OfflineQueue>,
    pub api: Arc<RestOrderApi>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub notifier: Notifier,
    pub sync: Arc<QueueSynchronizer>,
    pub checkout: CheckoutService,
    pub shop: ShopInfo,
}

impl AppState {
    /// Open local state and probe the backend once to seed connectivity.
    pub async fn open(config: &TerminalConfig) -> anyhow::Result<Self> {
        let store = LocalStore::open(&config.db_path).await?;
        let queue = Arc::new(
            OfflineQueue::open(Arc::new(store.clone()))
                .await
                .context("failed to load offline queue")?,
        );

        let api = Arc::new(
            RestOrderApi::new(&config.api_url, &config.api_key, config.http_timeout)
                .context("failed to build API client")?,
        );

        let initial = ConnectivityState::from_online(api.health().await);
        tracing::info!(?initial, pending = queue.len(), "terminal starting");

        let notifier = Notifier::new();
        let connectivity = Arc::new(ConnectivityMonitor::new(initial, notifier.clone()));
        let sync = Arc::new(
            QueueSynchronizer::new(queue.clone(), api.clone(), connectivity.clone(), notifier.clone())
                .with_min_retry_interval(config.sync_min_retry),
        );
        let checkout = CheckoutService::new(queue.clone(), api.clone(), connectivity.clone(), notifier.clone());

        let shop = ShopInfo {
            name: config.shop_name.clone(),
            ..ShopInfo::default()
        };

        Ok(Self {
            store,
            queue,
            api,
            connectivity,
            notifier,
            sync,
            checkout,
            shop,
        })
    }

    /// Start the background sync worker.
    pub fn spawn_sync_worker(&self) -> SyncWorkerHandle {
        SyncWorker::new(self.sync.clone(), self.connectivity.clone(), self.queue.clone()).start()
    }

    /// Live menu when reachable, otherwise the cached copy.
    pub async fn load_menu(&self) -> anyhow::Result<LoadedMenu> {
        let fetched = if self.connectivity.is_online() {
            self.api.fetch_menu().await
        } else {
            Err(crate::remote::RemoteError::Network("offline".to_string()))
        };
        resolve_menu(&self.store, fetched).await
    }

    pub fn status(&self) -> StatusIndicator {
        StatusIndicator::from_state(self.connectivity.state(), self.queue.len())
    }
}
