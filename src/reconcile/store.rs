//! Persisted configuration lookup
//!
//! The reconciler only ever reads from a store. A failing lookup is an
//! error, never an empty result.

use crate::error::{HostError, HostResult};
use crate::reconcile::model::ConfigKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Lookup key: element kind plus generated id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigFilter {
    pub kind: ConfigKind,
    pub id: String,
}

impl ConfigFilter {
    pub fn new(kind: ConfigKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// An existing configuration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub kind: ConfigKind,
    pub id: String,
}

impl ConfigEntry {
    pub fn new(kind: ConfigKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    fn matches(&self, filter: &ConfigFilter) -> bool {
        self.kind == filter.kind && self.id == filter.id
    }
}

/// Read access to already-persisted configuration
pub trait ConfigurationStore: Send + Sync {
    /// Entries matching `filter`, empty when none exist
    fn find(&self, filter: &ConfigFilter) -> HostResult<Vec<ConfigEntry>>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryConfigurationStore {
    entries: RwLock<Vec<ConfigEntry>>,
}

impl MemoryConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = ConfigEntry>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub fn insert(&self, entry: ConfigEntry) -> HostResult<()> {
        self.entries
            .write()
            .map_err(|_| HostError::Internal("configuration store lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

impl ConfigurationStore for MemoryConfigurationStore {
    fn find(&self, filter: &ConfigFilter) -> HostResult<Vec<ConfigEntry>> {
        let entries = self.entries.read().map_err(|_| {
            HostError::lookup(filter.kind.to_string(), &filter.id, "store lock poisoned")
        })?;
        Ok(entries.iter().filter(|e| e.matches(filter)).cloned().collect())
    }
}

#[derive(Debug, Default, Deserialize)]
struct StoreFile {
    #[serde(default)]
    entry: Vec<ConfigEntry>,
}

/// Store backed by a TOML file of `[[entry]]` tables with `kind` and `id`
#[derive(Debug)]
pub struct FileConfigurationStore {
    entries: Vec<ConfigEntry>,
}

impl FileConfigurationStore {
    /// Load the file; a missing file is an empty store
    pub async fn load(path: &Path) -> HostResult<Self> {
        if !path.exists() {
            debug!("No persisted configuration at {}", path.display());
            return Ok(Self { entries: vec![] });
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            HostError::io(format!("reading persisted configuration {}", path.display()), e)
        })?;
        let file: StoreFile = toml::from_str(&content).map_err(|e| HostError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!(
            "Loaded {} persisted configuration entries from {}",
            file.entry.len(),
            path.display()
        );
        Ok(Self {
            entries: file.entry,
        })
    }
}

impl ConfigurationStore for FileConfigurationStore {
    fn find(&self, filter: &ConfigFilter) -> HostResult<Vec<ConfigEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.matches(filter))
            .cloned()
            .collect())
    }
}

/// Queries each layer in order and returns the first non-empty answer
pub struct LayeredStore {
    layers: Vec<Arc<dyn ConfigurationStore>>,
}

impl LayeredStore {
    pub fn new(layers: Vec<Arc<dyn ConfigurationStore>>) -> Self {
        Self { layers }
    }
}

impl ConfigurationStore for LayeredStore {
    fn find(&self, filter: &ConfigFilter) -> HostResult<Vec<ConfigEntry>> {
        for layer in &self.layers {
            let found = layer.find(filter)?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Unreachable;

    impl ConfigurationStore for Unreachable {
        fn find(&self, filter: &ConfigFilter) -> HostResult<Vec<ConfigEntry>> {
            Err(HostError::lookup(filter.kind.to_string(), &filter.id, "unreachable"))
        }
    }

    #[test]
    fn memory_store_matches_kind_and_id() {
        let store = MemoryConfigurationStore::with_entries([ConfigEntry::new(
            ConfigKind::HttpEndpoint,
            "appHttpEndpoint-1-8080",
        )]);

        let hit = ConfigFilter::new(ConfigKind::HttpEndpoint, "appHttpEndpoint-1-8080");
        let wrong_kind = ConfigFilter::new(ConfigKind::VirtualHost, "appHttpEndpoint-1-8080");
        assert_eq!(store.find(&hit).unwrap().len(), 1);
        assert!(store.find(&wrong_kind).unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_loads_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persisted.toml");
        tokio::fs::write(
            &path,
            r#"
[[entry]]
kind = "virtualHost"
id = "default_host"

[[entry]]
kind = "keyStore"
id = "appKeyStore-1-8443"
"#,
        )
        .await
        .unwrap();

        let store = FileConfigurationStore::load(&path).await.unwrap();
        let filter = ConfigFilter::new(ConfigKind::KeyStore, "appKeyStore-1-8443");
        assert_eq!(store.find(&filter).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileConfigurationStore::load(&dir.path().join("none.toml"))
            .await
            .unwrap();
        let filter = ConfigFilter::new(ConfigKind::Ssl, "x");
        assert!(store.find(&filter).unwrap().is_empty());
    }

    #[test]
    fn layered_store_propagates_errors() {
        let empty: Arc<dyn ConfigurationStore> = Arc::new(MemoryConfigurationStore::new());
        let broken: Arc<dyn ConfigurationStore> = Arc::new(Unreachable);
        let layered = LayeredStore::new(vec![empty, broken]);

        let filter = ConfigFilter::new(ConfigKind::Ssl, "appSsl-1-8443");
        assert!(matches!(
            layered.find(&filter),
            Err(HostError::ConfigLookup { .. })
        ));
    }
}
