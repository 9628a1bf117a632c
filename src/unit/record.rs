//! Configuration unit records

use crate::error::{HostError, HostResult};
use crate::reconcile::ServerConfigurationModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

/// Discovery kind attached to every unit this host installs
pub const UNIT_KIND: &str = "fathost.config";

/// Restart-visible marker identifying the owner of a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTag {
    pub kind: String,
    pub instance_id: u64,
}

impl UnitTag {
    pub fn new(instance_id: u64) -> Self {
        Self {
            kind: UNIT_KIND.to_string(),
            instance_id,
        }
    }

    pub fn is_ours(&self) -> bool {
        self.kind == UNIT_KIND
    }
}

/// Handle returned by install, consumed by uninstall
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitHandle {
    pub name: String,
    pub instance_id: u64,
}

/// Installed configuration unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Unique unit name
    pub name: String,

    /// Discovery tag
    pub tag: UnitTag,

    /// Start ordering level, same as the host's own
    pub start_level: u32,

    /// Serialized configuration document
    pub document: String,

    /// Elements carried by the document
    pub model: ServerConfigurationModel,

    /// When the unit was installed
    pub created_at: DateTime<Utc>,
}

impl UnitRecord {
    pub fn new(
        instance_id: u64,
        start_level: u32,
        document: String,
        model: ServerConfigurationModel,
    ) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            name: format!("{}-{}-{}", UNIT_KIND, instance_id, &suffix[..8]),
            tag: UnitTag::new(instance_id),
            start_level,
            document,
            model,
            created_at: Utc::now(),
        }
    }

    pub fn handle(&self) -> UnitHandle {
        UnitHandle {
            name: self.name.clone(),
            instance_id: self.tag.instance_id,
        }
    }

    /// Record file path inside `dir`
    pub fn file_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.json"))
    }

    pub async fn save(&self, dir: &Path) -> HostResult<()> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| HostError::io("creating units directory", e))?;

        let path = Self::file_path(dir, &self.name);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .map_err(|e| HostError::io(format!("writing unit record {}", path.display()), e))?;
        Ok(())
    }

    /// Remove the record file; absent files are not an error
    pub async fn delete(dir: &Path, name: &str) -> HostResult<()> {
        let path = Self::file_path(dir, name);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| HostError::io(format!("deleting unit record {}", path.display()), e))?;
        }
        Ok(())
    }

    /// All readable records in `dir` carrying this host's tag, oldest first
    pub async fn list_all(dir: &Path) -> HostResult<Vec<UnitRecord>> {
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut records = vec![];
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| HostError::io("reading units directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HostError::io("reading unit entry", e))?
        {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<UnitRecord>(&content) {
                Ok(record) if record.tag.is_ours() => records.push(record),
                Ok(_) => {}
                Err(e) => warn!("Ignoring unreadable unit record {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}
