//! Per-dataset hub.
//!
//! A hub owns the canonical [`LWWElementSet`] of one dataset and the set of
//! subscribed replicas. Both live inside a single actor task; everything else
//! talks to it through a cloneable [`Hub`] handle.
//!
//! The handle feeds two queues. Joins and submissions go through the command
//! queue and are applied and fanned out strictly one at a time. Leaves,
//! teardown and read-only inspection go through the control queue, which the
//! actor keeps serving while a fan-out is waiting on a full subscriber buffer
//! under [`OverflowPolicy::Block`]. A stalled subscriber therefore delays
//! submissions but never prevents anyone from leaving or the dataset from
//! being torn down.
//!
//! When the actor task ends (teardown or a panic) its subscriber channels are
//! dropped with it: every open [`Subscription`] then reports
//! [`SyncError::Gone`], as does every call on a [`Hub`] handle.

use crate::archive::{ArchiveReason, CanonicalArchive};
use crate::config::{HubConfig, OverflowPolicy};
use crate::error::{SyncError, SyncResult};
use crate::state::SubscriberStatus;
use crate::subscription::{self, Delivery, SubscriberSlot, Subscription};
use converge_crdt::LWWElementSet;
use converge_types::{DatasetId, Operation, ReplicaId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Commands that mutate canonical state or the fan-out targets.
enum HubCommand {
    Join {
        replica_id: ReplicaId,
        resp: oneshot::Sender<(LWWElementSet, Subscription)>,
    },
    Submit {
        op: Operation,
        resp: oneshot::Sender<bool>,
    },
}

/// Commands served even while a fan-out is blocked.
enum Control {
    Leave {
        replica_id: ReplicaId,
        resp: oneshot::Sender<bool>,
    },
    Snapshot {
        resp: oneshot::Sender<LWWElementSet>,
    },
    Subscribers {
        resp: oneshot::Sender<Vec<SubscriberStatus>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// What a replica receives when it joins a dataset.
#[derive(Debug)]
pub struct Membership {
    /// Canonical state at the moment of joining, tombstones included.
    pub state: LWWElementSet,
    /// Operations submitted by other replicas after the join.
    pub subscription: Subscription,
}

impl Membership {
    /// The visible key/value view of the joined state.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.state.snapshot()
    }
}

struct HubActor {
    dataset_id: DatasetId,
    canonical: LWWElementSet,
    subscribers: HashMap<ReplicaId, SubscriberSlot>,
    rx: mpsc::Receiver<HubCommand>,
    control_rx: mpsc::Receiver<Control>,
    subscriber_capacity: usize,
    policy: OverflowPolicy,
    archive: Arc<dyn CanonicalArchive>,
    /// Set by a shutdown; answered only once the actor has released everything.
    shutdown: Option<oneshot::Sender<()>>,
}

impl HubActor {
    async fn run(mut self) {
        debug!("Hub {} started", self.dataset_id);
        while self.shutdown.is_none() {
            tokio::select! {
                biased;
                Some(ctrl) = self.control_rx.recv() => self.handle_control(ctrl).await,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
            }
        }
        info!(
            "Hub {} stopped, releasing {} subscriber(s)",
            self.dataset_id,
            self.subscribers.len()
        );
        let shutdown = self.shutdown.take();
        // Dropping the actor closes every subscription and both queues.
        drop(self);
        if let Some(resp) = shutdown {
            let _ = resp.send(());
        }
    }

    async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Join { replica_id, resp } => {
                let joined = self.join(replica_id);
                let _ = resp.send(joined);
            }
            HubCommand::Submit { op, resp } => {
                let changed = self.submit(op).await;
                let _ = resp.send(changed);
            }
        }
    }

    async fn handle_control(&mut self, ctrl: Control) {
        match ctrl {
            Control::Leave { replica_id, resp } => {
                let left = self.leave(&replica_id).await;
                let _ = resp.send(left);
            }
            Control::Snapshot { resp } => {
                let _ = resp.send(self.canonical.clone());
            }
            Control::Subscribers { resp } => {
                let _ = resp.send(self.statuses());
            }
            Control::Shutdown { resp } => {
                self.archive
                    .archive(self.dataset_id, self.canonical.clone(), ArchiveReason::Teardown)
                    .await;
                self.shutdown = Some(resp);
            }
        }
    }

    fn join(&mut self, replica_id: ReplicaId) -> (LWWElementSet, Subscription) {
        let (slot, subscription) =
            subscription::channel(self.dataset_id, replica_id.clone(), self.subscriber_capacity);
        if self.subscribers.insert(replica_id.clone(), slot).is_some() {
            debug!("Replica {} reconnected to {}", replica_id, self.dataset_id);
        } else {
            debug!("Replica {} joined {}", replica_id, self.dataset_id);
        }
        (self.canonical.clone(), subscription)
    }

    /// Applies an operation to canonical state and forwards it to every
    /// subscriber except its origin.
    ///
    /// Operations that lose to existing state are still forwarded; applying
    /// them is a no-op on any replica. A shutdown arriving mid fan-out
    /// abandons the remaining deliveries.
    async fn submit(&mut self, op: Operation) -> bool {
        let changed = self.canonical.apply(&op);
        let targets: Vec<ReplicaId> = self
            .subscribers
            .keys()
            .filter(|id| *id != op.origin())
            .cloned()
            .collect();
        for replica_id in targets {
            let delivery = match self.policy {
                OverflowPolicy::Block => self.deliver_blocking(&replica_id, &op).await,
                OverflowPolicy::DropAndFlag => match self.subscribers.get_mut(&replica_id) {
                    Some(slot) => slot.try_deliver(op.clone()),
                    None => Delivery::Released,
                },
            };
            match delivery {
                Delivery::Delivered | Delivery::Released => {}
                Delivery::Dropped => {
                    warn!(
                        "Subscriber {} of {} is full, dropped {}",
                        replica_id, self.dataset_id, op
                    );
                }
                Delivery::Closed => {
                    debug!("Pruning closed subscriber {} of {}", replica_id, self.dataset_id);
                    self.subscribers.remove(&replica_id);
                }
            }
            if self.shutdown.is_some() {
                break;
            }
        }
        changed
    }

    /// Waits for buffer space at one subscriber while still serving control
    /// commands.
    async fn deliver_blocking(&mut self, replica_id: &ReplicaId, op: &Operation) -> Delivery {
        let Some(tx) = self.subscribers.get(replica_id).map(SubscriberSlot::sender) else {
            return Delivery::Released;
        };
        let send = tx.send(op.clone());
        tokio::pin!(send);
        let mut control_open = true;
        loop {
            tokio::select! {
                sent = &mut send => {
                    return match sent {
                        Ok(()) => {
                            if let Some(slot) = self.subscribers.get_mut(replica_id) {
                                slot.record_delivered();
                            }
                            Delivery::Delivered
                        }
                        Err(_) => Delivery::Closed,
                    };
                }
                ctrl = self.control_rx.recv(), if control_open => match ctrl {
                    Some(ctrl) => {
                        self.handle_control(ctrl).await;
                        if self.shutdown.is_some() || !self.subscribers.contains_key(replica_id) {
                            debug!(
                                "Abandoned delivery of {} to {} on {}",
                                op, replica_id, self.dataset_id
                            );
                            return Delivery::Released;
                        }
                    }
                    None => control_open = false,
                },
            }
        }
    }

    async fn leave(&mut self, replica_id: &ReplicaId) -> bool {
        let removed = self.subscribers.remove(replica_id).is_some();
        if removed {
            debug!("Replica {} left {}", replica_id, self.dataset_id);
            if self.subscribers.is_empty() {
                self.archive
                    .archive(self.dataset_id, self.canonical.clone(), ArchiveReason::Idle)
                    .await;
            }
        }
        removed
    }

    fn statuses(&self) -> Vec<SubscriberStatus> {
        let mut statuses: Vec<_> = self
            .subscribers
            .iter()
            .map(|(replica_id, slot)| SubscriberStatus {
                replica_id: replica_id.clone(),
                delivered: slot.delivered(),
                dropped: slot.dropped_total(),
                connected: !slot.is_closed(),
            })
            .collect();
        statuses.sort_by(|a, b| a.replica_id.cmp(&b.replica_id));
        statuses
    }
}

/// Handle to a running hub. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Hub {
    dataset_id: DatasetId,
    tx: mpsc::Sender<HubCommand>,
    control: mpsc::Sender<Control>,
}

impl Hub {
    /// Starts a hub for a dataset with empty canonical state.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        dataset_id: DatasetId,
        config: &HubConfig,
        archive: Arc<dyn CanonicalArchive>,
    ) -> Self {
        Self::spawn_with_state(dataset_id, LWWElementSet::new(), config, archive)
    }

    /// Starts a hub seeded with existing canonical state.
    pub fn spawn_with_state(
        dataset_id: DatasetId,
        state: LWWElementSet,
        config: &HubConfig,
        archive: Arc<dyn CanonicalArchive>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.command_capacity());
        let (control, control_rx) = mpsc::channel(config.command_capacity());
        let actor = HubActor {
            dataset_id,
            canonical: state,
            subscribers: HashMap::new(),
            rx,
            control_rx,
            subscriber_capacity: config.subscriber_capacity(),
            policy: config.overflow_policy,
            archive,
            shutdown: None,
        };
        tokio::spawn(actor.run());
        Self {
            dataset_id,
            tx,
            control,
        }
    }

    /// The dataset this hub serves.
    pub fn dataset_id(&self) -> DatasetId {
        self.dataset_id
    }

    /// True once the hub's actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Subscribes a replica and returns the canonical state it starts from.
    ///
    /// Joining again with the same replica id replaces the earlier
    /// subscription, which then reports [`SyncError::Gone`].
    pub async fn join(&self, replica_id: ReplicaId) -> SyncResult<Membership> {
        let (state, subscription) = self
            .request(&self.tx, |resp| HubCommand::Join { replica_id, resp })
            .await?;
        Ok(Membership {
            state,
            subscription,
        })
    }

    /// Applies an operation to canonical state and fans it out.
    ///
    /// Returns once the hub has applied and forwarded the operation. The
    /// boolean reports whether canonical state changed.
    pub async fn submit(&self, op: Operation) -> SyncResult<bool> {
        op.validate()?;
        self.request(&self.tx, |resp| HubCommand::Submit { op, resp })
            .await
    }

    /// Unsubscribes a replica. Returns false if it was not subscribed.
    ///
    /// Also releases a fan-out that is blocked on this replica's buffer.
    pub async fn leave(&self, replica_id: &ReplicaId) -> SyncResult<bool> {
        let replica_id = replica_id.clone();
        self.request(&self.control, |resp| Control::Leave { replica_id, resp })
            .await
    }

    /// Full canonical state, tombstones included.
    pub async fn snapshot(&self) -> SyncResult<LWWElementSet> {
        self.request(&self.control, |resp| Control::Snapshot { resp })
            .await
    }

    /// Delivery status of every current subscriber, ordered by replica id.
    pub async fn subscribers(&self) -> SyncResult<Vec<SubscriberStatus>> {
        self.request(&self.control, |resp| Control::Subscribers { resp })
            .await
    }

    /// Archives the final state and stops the actor.
    ///
    /// Returns once every subscription has been released.
    pub(crate) async fn shutdown(&self) -> SyncResult<()> {
        self.request(&self.control, |resp| Control::Shutdown { resp })
            .await
    }

    async fn request<C, T>(
        &self,
        queue: &mpsc::Sender<C>,
        make: impl FnOnce(oneshot::Sender<T>) -> C,
    ) -> SyncResult<T> {
        let (resp, rx) = oneshot::channel();
        queue
            .send(make(resp))
            .await
            .map_err(|_| SyncError::Gone(self.dataset_id))?;
        rx.await.map_err(|_| SyncError::Gone(self.dataset_id))
    }
}
