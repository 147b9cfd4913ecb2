//! Per-subscriber delivery paths.
//!
//! Each joined replica gets a bounded channel. The hub holds the sending half
//! in a [`SubscriberSlot`]; the replica reads from the [`Subscription`].
//! Under [`OverflowPolicy::DropAndFlag`](crate::OverflowPolicy::DropAndFlag)
//! the slot counts dropped operations in a counter shared with the
//! subscription, which reports them on the next receive.

use crate::error::{SyncError, SyncResult};
use converge_types::{DatasetId, Operation, ReplicaId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// Creates a connected slot/subscription pair.
pub(crate) fn channel(
    dataset_id: DatasetId,
    replica_id: ReplicaId,
    capacity: usize,
) -> (SubscriberSlot, Subscription) {
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let slot = SubscriberSlot {
        tx,
        dropped: dropped.clone(),
        delivered: 0,
        dropped_total: 0,
    };
    let subscription = Subscription {
        dataset_id,
        replica_id,
        rx,
        dropped,
    };
    (slot, subscription)
}

/// Result of offering an operation to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    Dropped,
    /// The subscriber's receiving half is gone.
    Closed,
    /// The subscriber left or the hub stopped before the operation was handed over.
    Released,
}

/// Hub-side end of a subscription.
#[derive(Debug)]
pub(crate) struct SubscriberSlot {
    tx: mpsc::Sender<Operation>,
    dropped: Arc<AtomicU64>,
    delivered: u64,
    dropped_total: u64,
}

impl SubscriberSlot {
    /// Offers an operation without waiting; a full buffer drops it and flags
    /// the subscription.
    pub(crate) fn try_deliver(&mut self, op: Operation) -> Delivery {
        match self.tx.try_send(op) {
            Ok(()) => {
                self.delivered += 1;
                Delivery::Delivered
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::AcqRel);
                self.dropped_total += 1;
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// A sending handle for waiting deliveries. Waiting on it does not
    /// borrow the slot, so the hub can keep serving other commands.
    pub(crate) fn sender(&self) -> mpsc::Sender<Operation> {
        self.tx.clone()
    }

    pub(crate) fn record_delivered(&mut self) {
        self.delivered += 1;
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered
    }

    pub(crate) fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Replica-side stream of operations fanned out by a hub.
#[derive(Debug)]
pub struct Subscription {
    dataset_id: DatasetId,
    replica_id: ReplicaId,
    rx: mpsc::Receiver<Operation>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    /// The dataset this subscription belongs to.
    pub fn dataset_id(&self) -> DatasetId {
        self.dataset_id
    }

    /// The subscribed replica.
    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    /// Waits for the next operation.
    ///
    /// Returns [`SyncError::Overflow`] once after operations were dropped for
    /// this subscriber, and [`SyncError::Gone`] when the hub has released the
    /// subscription (teardown, reconnect elsewhere, or a stopped hub).
    pub async fn recv(&mut self) -> SyncResult<Operation> {
        self.take_overflow()?;
        match self.rx.recv().await {
            Some(op) => Ok(op),
            None => {
                self.take_overflow()?;
                Err(SyncError::Gone(self.dataset_id))
            }
        }
    }

    /// Returns the next operation if one is already buffered.
    pub fn try_recv(&mut self) -> SyncResult<Option<Operation>> {
        self.take_overflow()?;
        match self.rx.try_recv() {
            Ok(op) => Ok(Some(op)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(SyncError::Gone(self.dataset_id)),
        }
    }

    fn take_overflow(&self) -> SyncResult<()> {
        match self.dropped.swap(0, Ordering::AcqRel) {
            0 => Ok(()),
            dropped => Err(SyncError::Overflow {
                replica: self.replica_id.clone(),
                dropped,
            }),
        }
    }
}
