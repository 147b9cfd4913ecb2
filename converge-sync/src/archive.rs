//! Hand-off of canonical state to a persistence collaborator.
//!
//! Hubs keep canonical state in memory only. When a hub goes idle (its last
//! subscriber leaves) or is torn down, it hands a copy of its canonical set to
//! a [`CanonicalArchive`]. What the archive does with it is up to the
//! implementation.

use async_trait::async_trait;
use converge_crdt::LWWElementSet;
use converge_types::DatasetId;
use std::collections::HashMap;
use std::sync::Mutex;

/// Why a hub is handing over its canonical state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveReason {
    /// The last subscriber left; the hub stays alive.
    Idle,
    /// The dataset is being torn down; this is the final state.
    Teardown,
}

/// Receives canonical state from hubs.
#[async_trait]
pub trait CanonicalArchive: Send + Sync {
    /// Stores (or discards) the canonical state of a dataset.
    async fn archive(&self, dataset_id: DatasetId, state: LWWElementSet, reason: ArchiveReason);
}

/// Archive that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardArchive;

#[async_trait]
impl CanonicalArchive for DiscardArchive {
    async fn archive(&self, _dataset_id: DatasetId, _state: LWWElementSet, _reason: ArchiveReason) {}
}

/// Archive that keeps the latest state of each dataset in memory.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    entries: Mutex<HashMap<DatasetId, (LWWElementSet, ArchiveReason)>>,
}

impl MemoryArchive {
    /// Creates an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last archived state of a dataset, with the reason it was archived.
    pub fn get(&self, dataset_id: &DatasetId) -> Option<(LWWElementSet, ArchiveReason)> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(dataset_id).cloned())
    }

    /// Number of datasets archived so far.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    /// Returns true if nothing has been archived.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CanonicalArchive for MemoryArchive {
    async fn archive(&self, dataset_id: DatasetId, state: LWWElementSet, reason: ArchiveReason) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(dataset_id, (state, reason));
        }
    }
}
