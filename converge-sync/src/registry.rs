//! Dataset registry.
//!
//! Maps dataset ids to running hubs. Creating a dataset starts its hub;
//! tearing it down stops the hub and remembers the id, so later lookups can
//! tell a retired dataset ([`SyncError::Gone`]) from one that never existed
//! ([`SyncError::NotFound`]).

use crate::archive::{CanonicalArchive, DiscardArchive};
use crate::config::HubConfig;
use crate::error::{SyncError, SyncResult};
use crate::hub::Hub;
use converge_types::DatasetId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Default)]
struct Datasets {
    hubs: HashMap<DatasetId, Hub>,
    retired: HashSet<DatasetId>,
}

/// Owns the hubs of every live dataset.
pub struct Registry {
    config: HubConfig,
    archive: Arc<dyn CanonicalArchive>,
    datasets: RwLock<Datasets>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Registry {
    /// Creates a registry whose hubs discard their state on teardown.
    pub fn new(config: HubConfig) -> Self {
        Self::with_archive(config, Arc::new(DiscardArchive))
    }

    /// Creates a registry whose hubs hand their state to `archive`.
    pub fn with_archive(config: HubConfig, archive: Arc<dyn CanonicalArchive>) -> Self {
        Self {
            config,
            archive,
            datasets: RwLock::new(Datasets::default()),
        }
    }

    /// The configuration every hub is started with.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Creates a dataset with a fresh id and starts its hub.
    pub async fn create_dataset(&self) -> DatasetId {
        let dataset_id = DatasetId::new();
        let hub = Hub::spawn(dataset_id, &self.config, self.archive.clone());
        self.datasets.write().await.hubs.insert(dataset_id, hub);
        info!("Created dataset {}", dataset_id);
        dataset_id
    }

    /// Returns the hub of a live dataset.
    pub async fn lookup(&self, dataset_id: DatasetId) -> SyncResult<Hub> {
        let datasets = self.datasets.read().await;
        match datasets.hubs.get(&dataset_id) {
            Some(hub) if hub.is_closed() => {
                warn!("Hub for dataset {} stopped unexpectedly", dataset_id);
                Err(SyncError::Gone(dataset_id))
            }
            Some(hub) => Ok(hub.clone()),
            None if datasets.retired.contains(&dataset_id) => Err(SyncError::Gone(dataset_id)),
            None => Err(SyncError::NotFound(dataset_id)),
        }
    }

    /// Stops a dataset's hub. Its subscribers observe [`SyncError::Gone`].
    pub async fn teardown(&self, dataset_id: DatasetId) -> SyncResult<()> {
        let hub = {
            let mut datasets = self.datasets.write().await;
            let Some(hub) = datasets.hubs.remove(&dataset_id) else {
                return Err(if datasets.retired.contains(&dataset_id) {
                    SyncError::Gone(dataset_id)
                } else {
                    SyncError::NotFound(dataset_id)
                });
            };
            datasets.retired.insert(dataset_id);
            hub
        };
        // An already stopped hub has nothing left to archive.
        if let Err(e) = hub.shutdown().await {
            warn!("Hub for dataset {} was already stopped: {}", dataset_id, e);
        }
        info!("Tore down dataset {}", dataset_id);
        Ok(())
    }

    /// Ids of all live datasets, sorted.
    pub async fn datasets(&self) -> Vec<DatasetId> {
        let mut ids: Vec<_> = self.datasets.read().await.hubs.keys().copied().collect();
        ids.sort();
        ids
    }
}
