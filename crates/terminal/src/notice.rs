//! User-visible notices and the status indicator.
//!
//! Notices are transient toasts published on a broadcast channel; whoever
//! renders the UI subscribes. Nobody listening is fine: notices are also
//! logged.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::ConnectivityState;

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Notice {
    BackOnline,
    WentOffline,
    OrderQueued { pending: usize },
    OrderPlaced { reference: String },
    Synced { count: usize },
    PersistenceFailed { detail: String },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::BackOnline => "Back online! Syncing data...".to_string(),
            Notice::WentOffline => "You are offline. Orders will be saved locally.".to_string(),
            Notice::OrderQueued { .. } => "Order saved offline! Will sync when online.".to_string(),
            Notice::OrderPlaced { reference } => format!("Order {reference} placed successfully!"),
            Notice::Synced { count } => format!("Synced {count} offline orders!"),
            Notice::PersistenceFailed { detail } => {
                format!("Could not save offline orders to disk: {detail}")
            }
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Notice::WentOffline | Notice::PersistenceFailed { .. })
    }
}

/// Fan-out of notices to the UI.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, notice: Notice) {
        if notice.is_warning() {
            tracing::warn!(notice = %notice.message(), "notice");
        } else {
            tracing::info!(notice = %notice.message(), "notice");
        }
        // No receivers is not an error.
        let _ = self.tx.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// The persistent badge in the corner of the POS screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "indicator")]
pub enum StatusIndicator {
    Hidden,
    OfflineMode { pending: usize },
    Syncing { pending: usize },
}

impl StatusIndicator {
    pub fn from_state(state: ConnectivityState, pending: usize) -> Self {
        match (state, pending) {
            (ConnectivityState::Offline, pending) => StatusIndicator::OfflineMode { pending },
            (ConnectivityState::Online, 0) => StatusIndicator::Hidden,
            (ConnectivityState::Online, pending) => StatusIndicator::Syncing { pending },
        }
    }

    pub fn label(&self) -> Option<String> {
        match self {
            StatusIndicator::Hidden => None,
            StatusIndicator::OfflineMode { pending: 0 } => Some("Offline Mode".to_string()),
            StatusIndicator::OfflineMode { pending } => {
                Some(format!("Offline Mode ({pending} pending)"))
            }
            StatusIndicator::Syncing { pending } => Some(format!("Syncing {pending} orders...")),
        }
    }
}
