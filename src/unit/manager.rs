//! Configuration unit lifecycle

use crate::error::{HostError, HostResult};
use crate::reconcile::{
    ConfigEntry, ConfigFilter, ConfigurationStore, ModelSerializer, ServerConfigurationModel,
};
use crate::unit::record::{UnitHandle, UnitRecord};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Installs and tears down configuration units
pub struct UnitManager {
    dir: PathBuf,
    start_level: u32,
    serializer: Arc<dyn ModelSerializer>,
    live: RwLock<HashMap<String, UnitRecord>>,
    shutting_down: AtomicBool,
}

impl UnitManager {
    pub fn new(dir: impl Into<PathBuf>, start_level: u32, serializer: Arc<dyn ModelSerializer>) -> Self {
        Self {
            dir: dir.into(),
            start_level,
            serializer,
            live: RwLock::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize `model` and install it as a new unit owned by `instance_id`
    pub async fn install(
        &self,
        instance_id: u64,
        model: ServerConfigurationModel,
    ) -> HostResult<UnitHandle> {
        let document = self.serializer.serialize(&model)?;
        let record = UnitRecord::new(instance_id, self.start_level, document, model);
        record.save(&self.dir).await?;

        let handle = record.handle();
        self.live_mut()?.insert(record.name.clone(), record);

        info!("Installed configuration unit {}", handle.name);
        Ok(handle)
    }

    /// Tear a unit down.
    ///
    /// Skipped while the host is shutting down; leftovers are purged on the
    /// next activation instead. Returns whether the unit was removed.
    pub async fn uninstall(&self, handle: &UnitHandle) -> HostResult<bool> {
        if self.is_shutting_down() {
            debug!("Host shutting down, leaving unit {} for restart cleanup", handle.name);
            return Ok(false);
        }

        UnitRecord::delete(&self.dir, &handle.name).await?;
        self.live_mut()?.remove(&handle.name);

        info!("Uninstalled configuration unit {}", handle.name);
        Ok(true)
    }

    /// Units on disk left by this or a prior run
    pub async fn discover(&self) -> HostResult<Vec<UnitRecord>> {
        UnitRecord::list_all(&self.dir).await
    }

    /// Remove every discoverable unit regardless of shutdown state
    pub async fn purge(&self) -> HostResult<Vec<UnitRecord>> {
        let leftovers = self.discover().await?;
        for record in &leftovers {
            UnitRecord::delete(&self.dir, &record.name).await?;
            debug!(
                "Purged unit {} of instance {}",
                record.name, record.tag.instance_id
            );
        }
        self.live_mut()?.clear();

        if !leftovers.is_empty() {
            info!("Purged {} leftover configuration units", leftovers.len());
        }
        Ok(leftovers)
    }

    /// Mark the host as shutting down; later uninstalls become no-ops
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Number of units installed by this process and not yet removed
    pub fn live_count(&self) -> usize {
        self.live.read().map(|live| live.len()).unwrap_or(0)
    }

    fn live_mut(
        &self,
    ) -> HostResult<std::sync::RwLockWriteGuard<'_, HashMap<String, UnitRecord>>> {
        self.live
            .write()
            .map_err(|_| HostError::Internal("unit registry lock poisoned".to_string()))
    }
}

/// Live units count as persisted configuration for later reconciliation
impl ConfigurationStore for UnitManager {
    fn find(&self, filter: &ConfigFilter) -> HostResult<Vec<ConfigEntry>> {
        let live = self.live.read().map_err(|_| {
            HostError::lookup(filter.kind.to_string(), &filter.id, "unit registry lock poisoned")
        })?;

        Ok(live
            .values()
            .flat_map(|record| record.model.element_ids())
            .filter(|(kind, id)| *kind == filter.kind && *id == filter.id)
            .map(|(kind, id)| ConfigEntry::new(kind, id))
            .collect())
    }
}
