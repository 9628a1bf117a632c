//! Configuration management for fathost

pub mod schema;

pub use schema::Config;

use crate::error::{HostError, HostResult};
use semver::VersionReq;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Name of the writable library cache directory inside the work area
pub const LIBRARY_CACHE_DIR: &str = "lib.index.cache";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fathost")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fathost")
    }

    /// Load configuration, returning defaults if the file does not exist
    pub async fn load(&self) -> HostResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> HostResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| HostError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| HostError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> HostResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            HostError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> HostResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HostError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved runtime settings derived from [`Config`]
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// Writable work area root
    pub work_area: PathBuf,
    /// Optional read-only shared library root
    pub shared_library_root: Option<PathBuf>,
    /// Directory holding configuration unit records
    pub units_dir: PathBuf,
    /// Start level for configuration units
    pub start_level: u32,
    /// Readiness wait bound
    pub readiness_timeout: Duration,
    /// Extra entry-point arguments
    pub app_args: Vec<String>,
    /// Framework starter prefixes
    pub framework_starters: Vec<String>,
    /// Supported framework versions, if restricted
    pub supported_versions: Option<VersionReq>,
    /// Audit log location, `None` when disabled
    pub audit_log: Option<PathBuf>,
}

impl HostSettings {
    /// Resolve settings from a loaded configuration
    pub fn from_config(config: &Config) -> HostResult<Self> {
        let state_dir = config
            .host
            .state_dir
            .clone()
            .unwrap_or_else(ConfigManager::state_dir);
        let work_area = config
            .host
            .work_area
            .clone()
            .unwrap_or_else(|| state_dir.join("workarea"));

        let supported_versions = config
            .framework
            .supported_versions
            .as_deref()
            .map(|req| {
                VersionReq::parse(req).map_err(|e| HostError::ConfigInvalid {
                    path: PathBuf::from("[framework] supported_versions"),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            work_area,
            shared_library_root: config.host.shared_library_root.clone(),
            units_dir: state_dir.join("units"),
            start_level: config.host.start_level,
            readiness_timeout: Duration::from_secs(config.host.readiness_timeout_secs),
            app_args: config.host.app_args.clone(),
            framework_starters: config.library.framework_starters.clone(),
            supported_versions,
            audit_log: config
                .general
                .audit_log
                .then(|| state_dir.join("audit.log")),
        })
    }

    /// Settings rooted entirely under `root` (used by embedders and tests)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            work_area: root.join("workarea"),
            shared_library_root: None,
            units_dir: root.join("units"),
            start_level: 20,
            readiness_timeout: Duration::from_secs(300),
            app_args: vec![],
            framework_starters: schema::LibraryConfig::default().framework_starters,
            supported_versions: None,
            audit_log: None,
        }
    }

    /// Writable library cache root
    pub fn library_root(&self) -> PathBuf {
        self.work_area.join(LIBRARY_CACHE_DIR)
    }

    /// Root for per-library derived cache directories
    pub fn derived_root(&self) -> PathBuf {
        self.work_area.join("derived")
    }

    /// Directory receiving thinned archives
    pub fn thin_dir(&self) -> PathBuf {
        self.work_area.join("thin")
    }
}
