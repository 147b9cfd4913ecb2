//! Replication layer for converge.
//!
//! Replicas hold their own [`LWWElementSet`](converge_crdt::LWWElementSet)
//! and exchange operations through a per-dataset hub:
//!
//! 1. **Create**: the [`Registry`] starts a [`Hub`] for a new dataset
//! 2. **Join**: a [`Replica`] subscribes and seeds its set from the hub's
//!    canonical state
//! 3. **Mutate**: the replica applies an operation locally, then submits it
//! 4. **Fan-out**: the hub merges it into canonical state and forwards it to
//!    every other subscriber
//! 5. **Merge**: each receiving replica applies it with the same merge rule
//!
//! Merging is order-independent, so replicas converge no matter how
//! deliveries interleave.
//!
//! # Components
//!
//! - **Hub**: single-owner actor holding canonical state and subscriptions
//! - **Subscription**: bounded per-replica delivery path, see [`OverflowPolicy`]
//! - **Replica**: local set, hybrid clock and a background listener
//! - **Registry**: dataset id → hub, with teardown
//! - **Protocol**: serializable request/response records for a transport
//! - **Archive**: receives canonical state when a hub goes idle or is torn down
//!
//! # Example
//!
//! ```
//! use converge_sync::{HubConfig, Registry, Replica};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> converge_sync::SyncResult<()> {
//! let registry = Registry::new(HubConfig::default());
//! let dataset = registry.create_dataset().await;
//!
//! let mut replica = Replica::new("laptop");
//! replica.join(&registry, dataset).await?;
//! replica.add("color", "blue").await?;
//!
//! assert_eq!(replica.query("color").await.as_deref(), Some("blue"));
//! # Ok(())
//! # }
//! ```

mod archive;
mod config;
mod error;
mod hub;
mod protocol;
mod registry;
mod replica;
mod state;
mod subscription;

pub use archive::{ArchiveReason, CanonicalArchive, DiscardArchive, MemoryArchive};
pub use config::{DEFAULT_COMMAND_BUFFER, DEFAULT_SUBSCRIBER_BUFFER, HubConfig, OverflowPolicy};
pub use error::{SyncError, SyncResult};
pub use hub::{Hub, Membership};
pub use protocol::{
    Ack, CreateDatasetResponse, ErrorCode, ErrorResponse, JoinDatasetRequest, JoinDatasetResponse,
    LeaveDatasetRequest, SubmitOperationRequest,
};
pub use registry::Registry;
pub use replica::Replica;
pub use state::{ReplicaState, SubscriberStatus};
pub use subscription::Subscription;
