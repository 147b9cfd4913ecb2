//! Lifecycle and status types for replicas and hub subscribers.

use converge_types::ReplicaId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a replica.
///
/// `Unjoined → Joining → Active → Left`. A join from `Left` (or from
/// `Active`) is a reconnect and goes through `Joining` again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaState {
    /// Created standalone, never bound to a dataset.
    #[default]
    Unjoined,
    /// Waiting for the hub's snapshot and subscription.
    Joining,
    /// Bound to a dataset: mutating and listening.
    Active,
    /// Left its dataset.
    Left,
}

impl ReplicaState {
    /// True if the replica may mutate and receive operations.
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unjoined => "unjoined",
            Self::Joining => "joining",
            Self::Active => "active",
            Self::Left => "left",
        };
        f.write_str(name)
    }
}

/// A hub's view of one of its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberStatus {
    /// The subscribed replica.
    pub replica_id: ReplicaId,
    /// Operations handed to the subscriber's buffer.
    pub delivered: u64,
    /// Operations dropped because the buffer was full.
    pub dropped: u64,
    /// False once the subscriber stopped reading.
    pub connected: bool,
}
