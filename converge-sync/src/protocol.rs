//! Transport-agnostic request and response records.
//!
//! These are the messages a network binding would carry between replicas and
//! the registry. Requests are validated here, at the boundary, so nothing
//! malformed reaches a hub. The handlers on [`Registry`] map each request to
//! the corresponding hub call.

use crate::error::{SyncError, SyncResult};
use crate::registry::Registry;
use crate::subscription::Subscription;
use converge_crdt::LWWElementSet;
use converge_types::{DatasetId, Error, Operation, OperationKind, OrderingKey, ReplicaId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reply to a dataset creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDatasetResponse {
    pub dataset_id: DatasetId,
}

/// Request to join a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDatasetRequest {
    pub dataset_id: DatasetId,
    pub replica_id: ReplicaId,
}

/// Reply to a join.
///
/// The subscription itself is handed over alongside this record, not inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDatasetResponse {
    pub dataset_id: DatasetId,
    /// Visible key/value view at the time of joining.
    pub snapshot: BTreeMap<String, String>,
    /// Full canonical state for seeding the replica's set.
    pub state: LWWElementSet,
}

/// Request to submit an operation.
///
/// `kind` is accepted as a name (`add`, `update`, `upsert`, `remove`,
/// `delete`) or a numeric code (`0`, `1`, `2`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOperationRequest {
    pub dataset_id: DatasetId,
    pub replica_id: ReplicaId,
    pub kind: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub ordering_key: OrderingKey,
}

impl SubmitOperationRequest {
    /// Builds a request carrying an existing operation.
    pub fn new(dataset_id: DatasetId, op: &Operation) -> Self {
        Self {
            dataset_id,
            replica_id: op.origin().clone(),
            kind: op.kind().to_string(),
            key: op.key().to_string(),
            value: op.value().map(str::to_owned),
            ordering_key: op.ordering_key().clone(),
        }
    }

    /// Validates the request and converts it into an operation.
    pub fn to_operation(&self) -> SyncResult<Operation> {
        let kind: OperationKind = self.kind.parse()?;
        if self.ordering_key.origin() != &self.replica_id {
            return Err(Error::MalformedOperation(format!(
                "ordering key origin {} does not match replica {}",
                self.ordering_key.origin(),
                self.replica_id
            ))
            .into());
        }
        Ok(Operation::from_parts(
            kind,
            self.key.clone(),
            self.value.clone(),
            self.ordering_key.clone(),
        )?)
    }
}

/// Request to leave a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveDatasetRequest {
    pub dataset_id: DatasetId,
    pub replica_id: ReplicaId,
}

/// Positive acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub dataset_id: DatasetId,
}

/// Error codes carried in [`ErrorResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Gone,
    Overflow,
    Malformed,
    NotJoined,
    InvalidConfig,
}

/// Error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
}

impl From<&SyncError> for ErrorResponse {
    fn from(err: &SyncError) -> Self {
        let code = match err {
            SyncError::NotFound(_) => ErrorCode::NotFound,
            SyncError::Gone(_) => ErrorCode::Gone,
            SyncError::Overflow { .. } => ErrorCode::Overflow,
            SyncError::Malformed(_) => ErrorCode::Malformed,
            SyncError::NotJoined(_) => ErrorCode::NotJoined,
            SyncError::Config(_) => ErrorCode::InvalidConfig,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl Registry {
    /// Handles `CreateDataset`.
    pub async fn handle_create(&self) -> CreateDatasetResponse {
        CreateDatasetResponse {
            dataset_id: self.create_dataset().await,
        }
    }

    /// Handles `JoinDataset`.
    pub async fn handle_join(
        &self,
        req: JoinDatasetRequest,
    ) -> SyncResult<(JoinDatasetResponse, Subscription)> {
        let hub = self.lookup(req.dataset_id).await?;
        let membership = hub.join(req.replica_id).await?;
        let response = JoinDatasetResponse {
            dataset_id: req.dataset_id,
            snapshot: membership.snapshot(),
            state: membership.state,
        };
        Ok((response, membership.subscription))
    }

    /// Handles `SubmitOperation`.
    pub async fn handle_submit(&self, req: SubmitOperationRequest) -> SyncResult<Ack> {
        let op = req.to_operation()?;
        let hub = self.lookup(req.dataset_id).await?;
        hub.submit(op).await?;
        Ok(Ack {
            dataset_id: req.dataset_id,
        })
    }

    /// Handles `LeaveDataset`. Leaving a dataset one is not subscribed to is
    /// acknowledged as well.
    pub async fn handle_leave(&self, req: LeaveDatasetRequest) -> SyncResult<Ack> {
        let hub = self.lookup(req.dataset_id).await?;
        hub.leave(&req.replica_id).await?;
        Ok(Ack {
            dataset_id: req.dataset_id,
        })
    }
}
