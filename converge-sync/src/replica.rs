//! Client-side replica of a dataset.
//!
//! A replica owns its local [`LWWElementSet`] and a [`HybridClock`]. Local
//! mutations are applied immediately and then submitted to the hub; remote
//! operations arrive on a background listener task that merges them through
//! the same path.

use crate::error::{SyncError, SyncResult};
use crate::hub::Hub;
use crate::registry::Registry;
use crate::state::ReplicaState;
use crate::subscription::Subscription;
use converge_crdt::LWWElementSet;
use converge_types::{DatasetId, HybridClock, Operation, OperationKind, ReplicaId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// State shared between a replica and its listener task.
#[derive(Clone)]
struct Local {
    id: ReplicaId,
    clock: Arc<Mutex<HybridClock>>,
    set: Arc<RwLock<LWWElementSet>>,
}

impl Local {
    async fn apply_remote(&self, op: &Operation) -> bool {
        if op.origin() == &self.id {
            return false;
        }
        self.clock.lock().await.observe(op.ordering_key());
        self.set.write().await.apply(op)
    }

    async fn merge_state(&self, state: &LWWElementSet) {
        {
            let mut clock = self.clock.lock().await;
            for op in state.operations() {
                clock.observe(op.ordering_key());
            }
        }
        self.set.write().await.merge(state);
    }

    async fn resync(&self, hub: &Hub) -> SyncResult<()> {
        let canonical = hub.snapshot().await?;
        self.merge_state(&canonical).await;
        Ok(())
    }
}

/// Binding of a replica to one hub.
struct Session {
    hub: Hub,
    shutdown: oneshot::Sender<()>,
    listener: JoinHandle<()>,
}

impl Session {
    /// Stops the listener and waits for it to exit, dropping its subscription.
    async fn stop(self) -> Hub {
        let _ = self.shutdown.send(());
        if let Err(e) = self.listener.await {
            if e.is_panic() {
                warn!("Listener for dataset {} panicked", self.hub.dataset_id());
            }
        }
        self.hub
    }
}

/// One holder of a replicated key/value set.
pub struct Replica {
    local: Local,
    state: ReplicaState,
    session: Option<Session>,
}

impl Replica {
    /// Creates an unjoined replica whose clock follows system time.
    pub fn new(id: impl Into<ReplicaId>) -> Self {
        let id = id.into();
        let clock = HybridClock::new(id.clone());
        Self::with_clock(clock)
    }

    /// Creates an unjoined replica driven by the given clock.
    ///
    /// The replica takes its id from the clock's origin.
    pub fn with_clock(clock: HybridClock) -> Self {
        Self {
            local: Local {
                id: clock.origin().clone(),
                clock: Arc::new(Mutex::new(clock)),
                set: Arc::new(RwLock::new(LWWElementSet::new())),
            },
            state: ReplicaState::Unjoined,
            session: None,
        }
    }

    /// This replica's id.
    pub fn id(&self) -> &ReplicaId {
        &self.local.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReplicaState {
        self.state
    }

    /// The dataset this replica is bound to, if any.
    pub fn dataset_id(&self) -> Option<DatasetId> {
        self.session.as_ref().map(|s| s.hub.dataset_id())
    }

    /// Looks up a dataset in `registry` and joins its hub.
    pub async fn join(&mut self, registry: &Registry, dataset_id: DatasetId) -> SyncResult<()> {
        let hub = registry.lookup(dataset_id).await?;
        self.join_hub(hub).await
    }

    /// Joins a hub directly.
    ///
    /// If the replica is already bound, the old listener is stopped first.
    /// Rejoining the same hub replaces the subscription there; moving to a
    /// different hub leaves the old one.
    pub async fn join_hub(&mut self, hub: Hub) -> SyncResult<()> {
        let rejoining = self.session.is_some();
        if let Some(session) = self.session.take() {
            let old = session.stop().await;
            if old.dataset_id() != hub.dataset_id() {
                if let Err(e) = old.leave(&self.local.id).await {
                    debug!("Leaving previous dataset {} failed: {}", old.dataset_id(), e);
                }
            }
        }

        let fallback = if rejoining {
            ReplicaState::Left
        } else {
            self.state
        };
        self.state = ReplicaState::Joining;
        let membership = match hub.join(self.local.id.clone()).await {
            Ok(membership) => membership,
            Err(e) => {
                self.state = fallback;
                return Err(e);
            }
        };

        self.local.merge_state(&membership.state).await;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let listener = tokio::spawn(listen(
            self.local.clone(),
            hub.clone(),
            membership.subscription,
            shutdown_rx,
        ));
        info!(
            "Replica {} joined dataset {}{}",
            self.local.id,
            hub.dataset_id(),
            if rejoining { " (reconnect)" } else { "" }
        );
        self.session = Some(Session {
            hub,
            shutdown,
            listener,
        });
        self.state = ReplicaState::Active;
        Ok(())
    }

    /// Applies a local mutation and submits it to the hub.
    ///
    /// The local set is updated before the submission, so local reads see
    /// the mutation even if the hub is unreachable.
    pub async fn mutate(
        &self,
        kind: OperationKind,
        key: impl Into<String>,
        value: Option<String>,
    ) -> SyncResult<Operation> {
        let session = self.active_session()?;
        let ordering_key = self.local.clock.lock().await.tick();
        let op = Operation::from_parts(kind, key, value, ordering_key)?;
        self.local.set.write().await.apply(&op);
        session.hub.submit(op.clone()).await?;
        Ok(op)
    }

    /// Adds or updates a key.
    pub async fn add(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> SyncResult<Operation> {
        self.mutate(OperationKind::Add, key, Some(value.into()))
            .await
    }

    /// Removes a key.
    pub async fn remove(&self, key: impl Into<String>) -> SyncResult<Operation> {
        self.mutate(OperationKind::Remove, key, None).await
    }

    /// Merges an operation received from elsewhere.
    ///
    /// Operations stamped with this replica's own id are skipped. Returns
    /// true if the local set changed.
    pub async fn apply_remote(&self, op: &Operation) -> bool {
        self.local.apply_remote(op).await
    }

    /// Fetches the hub's canonical state and merges it into the local set.
    pub async fn resync(&self) -> SyncResult<()> {
        let session = self.active_session()?;
        self.local.resync(&session.hub).await
    }

    /// The visible key/value view of the local set.
    pub async fn current_view(&self) -> BTreeMap<String, String> {
        self.local.set.read().await.snapshot()
    }

    /// Looks up one key in the local set.
    pub async fn query(&self, key: &str) -> Option<String> {
        self.local.set.read().await.query(key).map(str::to_owned)
    }

    /// A copy of the full local state, tombstones included.
    pub async fn local_state(&self) -> LWWElementSet {
        self.local.set.read().await.clone()
    }

    /// Stops listening and unsubscribes from the hub.
    ///
    /// The local set is kept; a later join reconnects.
    pub async fn leave(&mut self) -> SyncResult<()> {
        if !self.state.is_active() {
            return Err(SyncError::NotJoined(self.local.id.clone()));
        }
        let Some(session) = self.session.take() else {
            return Err(SyncError::NotJoined(self.local.id.clone()));
        };
        let hub = session.stop().await;
        self.state = ReplicaState::Left;
        hub.leave(&self.local.id).await?;
        info!("Replica {} left dataset {}", self.local.id, hub.dataset_id());
        Ok(())
    }

    fn active_session(&self) -> SyncResult<&Session> {
        match (&self.session, self.state) {
            (Some(session), ReplicaState::Active) => Ok(session),
            _ => Err(SyncError::NotJoined(self.local.id.clone())),
        }
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.listener.abort();
        }
    }
}

async fn listen(
    local: Local,
    hub: Hub,
    mut subscription: Subscription,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            next = subscription.recv() => match next {
                Ok(op) => {
                    local.apply_remote(&op).await;
                }
                Err(SyncError::Overflow { dropped, .. }) => {
                    warn!(
                        "Replica {} missed {} operation(s) on {}, resyncing",
                        local.id, dropped, hub.dataset_id()
                    );
                    if let Err(e) = local.resync(&hub).await {
                        warn!("Resync of replica {} failed: {}", local.id, e);
                        break;
                    }
                }
                Err(e) => {
                    debug!("Listener for replica {} stopping: {}", local.id, e);
                    break;
                }
            }
        }
    }
}
