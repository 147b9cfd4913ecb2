//! Core type definitions for converge.
//!
//! This crate defines the types shared by the CRDT core and the replication
//! layer:
//! - Dataset and replica identifiers
//! - Ordering keys and the hybrid clock that issues them
//! - Add/remove operations and their boundary validation

mod clock;
mod ids;
mod operation;

pub use clock::{HybridClock, OrderingKey};
pub use ids::{DatasetId, ReplicaId};
pub use operation::{Operation, OperationKind};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or decoding operations.
///
/// Id parsing reports [`uuid::Error`] directly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid operation kind: {0}")]
    InvalidKind(String),

    #[error("malformed operation: {0}")]
    MalformedOperation(String),
}
