//! Hub configuration.

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};

/// Default depth of a hub's command queue.
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Default depth of each subscriber's delivery buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// What a hub does when a subscriber's delivery buffer is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for buffer space. Nothing is lost, but a stalled subscriber
    /// stalls the hub until it drains or disconnects.
    #[default]
    Block,
    /// Drop the operation for that subscriber and flag it; the subscriber
    /// sees an overflow and resyncs from a canonical snapshot.
    DropAndFlag,
}

/// Configuration shared by every hub a registry creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Capacity of the hub's command queue. Submitters wait when it is full.
    pub command_buffer: usize,
    /// Capacity of each subscriber's delivery buffer.
    pub subscriber_buffer: usize,
    /// Behaviour when a delivery buffer is full.
    pub overflow_policy: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_buffer: DEFAULT_COMMAND_BUFFER,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            overflow_policy: OverflowPolicy::Block,
        }
    }
}

impl HubConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the overflow policy.
    #[must_use]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Sets the per-subscriber buffer capacity.
    #[must_use]
    pub fn with_subscriber_buffer(mut self, capacity: usize) -> Self {
        self.subscriber_buffer = capacity;
        self
    }

    // tokio channels panic on a zero capacity.
    pub(crate) fn command_capacity(&self) -> usize {
        self.command_buffer.max(1)
    }

    pub(crate) fn subscriber_capacity(&self) -> usize {
        self.subscriber_buffer.max(1)
    }
}
