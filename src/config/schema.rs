//! Configuration schema for fathost
//!
//! Configuration is stored at `~/.config/fathost/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Host process settings
    pub host: HostConfig,

    /// Library cache settings
    pub library: LibraryConfig,

    /// Hosted framework compatibility
    pub framework: FrameworkConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable the deployment journal
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Host process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// State directory (units, audit log). Defaults to the platform state dir.
    pub state_dir: Option<PathBuf>,

    /// Writable work area (thinned archives, library cache, derived caches).
    /// Defaults to `<state_dir>/workarea`.
    pub work_area: Option<PathBuf>,

    /// Optional read-only library root shared between host processes
    pub shared_library_root: Option<PathBuf>,

    /// Start level assigned to generated configuration units
    pub start_level: u32,

    /// Upper bound on the post-deploy readiness wait, in seconds
    pub readiness_timeout_secs: u64,

    /// Extra arguments passed to every entry point
    pub app_args: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            work_area: None,
            shared_library_root: None,
            start_level: 20,
            readiness_timeout_secs: 300,
            app_args: vec![],
        }
    }
}

/// Library cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// File-name prefixes of libraries the host framework already provides.
    /// Matching libraries are left off the classpath of non-indexed packages.
    pub framework_starters: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            framework_starters: vec![
                "spring-boot-starter-tomcat-".to_string(),
                "spring-boot-starter-jetty-".to_string(),
                "spring-boot-starter-undertow-".to_string(),
                "tomcat-embed-".to_string(),
            ],
        }
    }
}

/// Hosted framework compatibility configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Semver requirement the package's `Boot-Version` must satisfy (e.g. ">=1.5, <4")
    pub supported_versions: Option<String>,
}
