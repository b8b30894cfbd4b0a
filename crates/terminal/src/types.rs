//! Shared types for the offline queue and its synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kade_core::{DomainResult, Money, OrderId};
use kade_sales::{OrderLine, validate_lines};

/// Primary key of a queued order: the instant it was queued.
///
/// The queue guarantees keys are strictly increasing, so two orders queued
/// within the same clock tick still get distinct keys.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueKey(DateTime<Utc>);

impl QueueKey {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }
}

impl core::fmt::Display for QueueKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
    }
}

/// An order captured at the counter, ready to be queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub items: Vec<OrderLine>,
    pub total_amount: Money,
    /// Business time of the sale.
    pub created_at: DateTime<Utc>,
}

impl PendingOrder {
    /// Build from cart lines, computing the total from the lines.
    pub fn from_lines(items: Vec<OrderLine>, created_at: DateTime<Utc>) -> DomainResult<Self> {
        let total_amount = kade_sales::order_total(&items)?;
        let order = Self {
            items,
            total_amount,
            created_at,
        };
        order.validate()?;
        Ok(order)
    }

    pub fn validate(&self) -> DomainResult<()> {
        validate_lines(&self.items, self.total_amount)
    }
}

/// An order waiting in the offline queue.
///
/// Never mutated once queued; only removed after a confirmed sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOrder {
    pub items: Vec<OrderLine>,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub queued_at: QueueKey,
}

impl QueuedOrder {
    pub(crate) fn from_pending(order: PendingOrder, queued_at: QueueKey) -> Self {
        Self {
            items: order.items,
            total_amount: order.total_amount,
            created_at: order.created_at,
            queued_at,
        }
    }
}

/// Connectivity state of the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// Network reachable; writes go straight to the backend.
    Online,
    /// Network unreachable; orders are queued locally.
    Offline,
}

impl ConnectivityState {
    pub fn is_online(self) -> bool {
        matches!(self, ConnectivityState::Online)
    }

    pub fn from_online(online: bool) -> Self {
        if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }
}

/// Why a drain pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// The terminal just came back online.
    ConnectivityRestored,
    /// The queue changed (or a retry came due) while online.
    QueueNonEmptyWhileOnline,
    /// Operator asked for a sync.
    Manual,
}

/// Why a drain request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyDraining,
    QueueEmpty,
    Offline,
    /// A recent pass failed and the minimum retry interval has not elapsed.
    CoolingDown,
}

/// Which remote write stopped a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum FailedStage {
    CreateOrder,
    /// The order row exists remotely without items.
    CreateItems { orphaned_order: OrderId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub queued_at: QueueKey,
    pub stage: FailedStage,
    pub error: String,
}

/// Result of one drain pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    /// Keys of the orders committed remotely, in replay order.
    pub synced: Vec<QueueKey>,
    /// Orders still queued when the pass ended.
    pub remaining: usize,
    pub stopped_on: Option<SyncFailure>,
}

impl SyncReport {
    pub fn synced_count(&self) -> usize {
        self.synced.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SyncOutcome {
    Skipped { reason: SkipReason },
    Completed(SyncReport),
}
