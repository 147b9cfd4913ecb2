//! Ordering keys and the per-replica hybrid clock that produces them.
//!
//! An [`OrderingKey`] is only ever compared, never interpreted as a point in
//! time. The clock folds physical time and a logical counter into a single
//! integer:
//! - Monotonicity: every tick is strictly greater than the previous one
//! - Causality: after observing a remote key, the next tick is greater than it
//! - Bounded drift: with a physical source, ticks track wall-clock milliseconds

use crate::ReplicaId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Totally ordered tag attached to every operation.
///
/// Compares `timestamp` first and breaks ties with the origin replica id
/// (lexicographic). Two keys are equal only if both components are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderingKey {
    timestamp: u64,
    origin: ReplicaId,
}

impl OrderingKey {
    /// Creates an ordering key from its components.
    #[must_use]
    pub fn new(timestamp: u64, origin: impl Into<ReplicaId>) -> Self {
        Self {
            timestamp,
            origin: origin.into(),
        }
    }

    /// Returns the timestamp component.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns the replica that issued this key.
    #[must_use]
    pub fn origin(&self) -> &ReplicaId {
        &self.origin
    }

    /// True if both keys carry the same timestamp but come from different replicas.
    #[must_use]
    pub fn is_concurrent_with(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.origin != other.origin
    }
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.timestamp.cmp(&other.timestamp) {
            Ordering::Equal => self.origin.cmp(&other.origin),
            other => other,
        }
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.timestamp, self.origin)
    }
}

/// Where a [`HybridClock`] reads its physical component from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeSource {
    /// Milliseconds since the Unix epoch.
    System,
    /// No physical component; the clock is a plain Lamport counter.
    Logical,
}

/// Issues monotonic ordering keys for a single replica.
#[derive(Debug, Clone)]
pub struct HybridClock {
    origin: ReplicaId,
    last: u64,
    source: TimeSource,
}

impl HybridClock {
    /// Creates a clock driven by system time.
    #[must_use]
    pub fn new(origin: impl Into<ReplicaId>) -> Self {
        Self {
            origin: origin.into(),
            last: 0,
            source: TimeSource::System,
        }
    }

    /// Creates a clock with no physical component (deterministic, for replay and tests).
    #[must_use]
    pub fn logical(origin: impl Into<ReplicaId>) -> Self {
        Self {
            origin: origin.into(),
            last: 0,
            source: TimeSource::Logical,
        }
    }

    /// The replica this clock stamps keys for.
    #[must_use]
    pub fn origin(&self) -> &ReplicaId {
        &self.origin
    }

    /// The highest timestamp issued or observed so far.
    #[must_use]
    pub const fn last(&self) -> u64 {
        self.last
    }

    /// Issues the next ordering key.
    ///
    /// Jumps forward to physical time when it is ahead, otherwise advances
    /// the counter by one.
    pub fn tick(&mut self) -> OrderingKey {
        let next = self.last.saturating_add(1).max(self.physical_now());
        self.last = next;
        OrderingKey::new(next, self.origin.clone())
    }

    /// Folds a remote key into the clock so the next tick orders after it.
    pub fn observe(&mut self, key: &OrderingKey) {
        self.last = self.last.max(key.timestamp());
    }

    fn physical_now(&self) -> u64 {
        match self.source {
            TimeSource::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or_default(),
            TimeSource::Logical => 0,
        }
    }
}
