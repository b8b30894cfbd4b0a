//! Connectivity monitor.
//!
//! Translates platform online/offline signals into the shared
//! [`ConnectivityState`]. Purely event driven: the state is seeded once at
//! startup and afterwards only changes when a signal arrives. Signals that
//! repeat the current state are ignored.

use tokio::sync::{broadcast, watch};

use crate::notice::{Notice, Notifier};
pub use crate::types::ConnectivityState;

const EVENT_CAPACITY: usize = 16;

/// A state transition observed by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Offline → online.
    Restored,
    /// Online → offline.
    Lost,
}

/// Registration for connectivity transitions.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct ConnectivitySubscription {
    rx: broadcast::Receiver<ConnectivityEvent>,
}

impl ConnectivitySubscription {
    /// Next transition; `None` once the monitor is gone.
    pub async fn next(&mut self) -> Option<ConnectivityEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "connectivity subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Connectivity monitor.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    events: broadcast::Sender<ConnectivityEvent>,
    notifier: Notifier,
}

impl ConnectivityMonitor {
    /// Start with the platform-reported state.
    pub fn new(initial: ConnectivityState, notifier: Notifier) -> Self {
        let (state, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        tracing::info!(state = ?initial, "connectivity monitor started");
        Self {
            state,
            events,
            notifier,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Platform reported the network is back. Returns whether the state
    /// changed.
    pub fn set_online(&self) -> bool {
        if !self.transition(ConnectivityState::Online) {
            return false;
        }
        self.notifier.emit(Notice::BackOnline);
        let _ = self.events.send(ConnectivityEvent::Restored);
        true
    }

    /// Platform reported the network is gone. Returns whether the state
    /// changed.
    pub fn set_offline(&self) -> bool {
        if !self.transition(ConnectivityState::Offline) {
            return false;
        }
        self.notifier.emit(Notice::WentOffline);
        let _ = self.events.send(ConnectivityEvent::Lost);
        true
    }

    pub fn subscribe(&self) -> ConnectivitySubscription {
        ConnectivitySubscription {
            rx: self.events.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn transition(&self, to: ConnectivityState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == to {
                false
            } else {
                *current = to;
                true
            }
        });
        if changed {
            tracing::info!(state = ?to, "connectivity changed");
        }
        changed
    }
}
