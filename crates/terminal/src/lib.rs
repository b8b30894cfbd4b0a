//! `kade-terminal`
//!
//! **Responsibility:** Point-of-sale terminal with offline order capture.
//!
//! This crate provides:
//! - Connectivity monitoring with transition events
//! - A durable FIFO queue of orders taken while offline
//! - Queue replay to the backend, one drain at a time, stopping at the
//!   first failure
//! - Checkout that places orders directly when online and queues them
//!   otherwise
//!
//! The backend stays the authority for orders; the terminal only holds what
//! it could not deliver yet.

pub mod app;
pub mod cache;
pub mod checkout;
pub mod config;
pub mod notice;
pub mod offline;
pub mod offline_queue;
pub mod remote;
pub mod storage;
pub mod sync_manager;
pub mod sync_worker;
pub mod types;

pub use app::AppState;
pub use cache::LocalStore;
pub use checkout::{CheckoutError, CheckoutOutcome, CheckoutReceipt, CheckoutService};
pub use config::{ConfigError, TerminalConfig};
pub use notice::{Notice, Notifier, StatusIndicator};
pub use offline::{ConnectivityEvent, ConnectivityMonitor, ConnectivityState};
pub use offline_queue::{EnqueueError, OfflineQueue, PersistenceError};
pub use remote::{InMemoryOrderApi, OrderApi, RemoteError, RemoteWriteError, RestOrderApi};
pub use storage::{MemoryStorage, QueueStorage, StorageError};
pub use sync_manager::{QueueSynchronizer, SyncPhase};
pub use sync_worker::{SyncWorker, SyncWorkerHandle};
pub use types::{PendingOrder, QueueKey, QueuedOrder, SyncOutcome, SyncReport, SyncTrigger};
