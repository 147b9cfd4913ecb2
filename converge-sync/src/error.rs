//! Error types for the replication layer.

use converge_types::{DatasetId, ReplicaId};
use thiserror::Error;

/// Result type for replication operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in replication operations.
///
/// Nothing here originates in the CRDT core; merging never fails.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The dataset id is unknown to the registry.
    #[error("dataset not found: {0}")]
    NotFound(DatasetId),

    /// The dataset was torn down, or its hub stopped unexpectedly.
    #[error("dataset gone: {0}")]
    Gone(DatasetId),

    /// Operations were dropped because the subscriber's buffer was full.
    #[error("subscriber {replica} overflowed, {dropped} operation(s) dropped")]
    Overflow { replica: ReplicaId, dropped: u64 },

    /// The operation was rejected at the boundary.
    #[error("malformed operation: {0}")]
    Malformed(#[from] converge_types::Error),

    /// The replica is not bound to a dataset.
    #[error("replica {0} has not joined a dataset")]
    NotJoined(ReplicaId),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
