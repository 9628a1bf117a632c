//! Error types for fathost
//!
//! All modules use `HostResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for host operations
pub type HostResult<T> = Result<T, HostError>;

/// All errors that can occur while hosting a package
#[derive(Error, Debug)]
pub enum HostError {
    // Assembly errors
    #[error("Library {entry} (hash {hash}) is not present in any library cache root")]
    MissingLibrary { entry: String, hash: String },

    #[error("Invalid library reference {reference}: {reason}")]
    InvalidLibraryReference { reference: String, reason: String },

    #[error("Malformed index line {line_no}: {line:?}")]
    IndexParse { line_no: usize, line: String },

    #[error("Package not found: {0}")]
    PackageNotFound(PathBuf),

    #[error("Invalid manifest in {package}: {reason}")]
    ManifestInvalid { package: String, reason: String },

    #[error("Thinning {source_archive} failed: {reason}")]
    Thinning {
        source_archive: PathBuf,
        reason: String,
    },

    // Reconciliation errors
    #[error("Only one {kind} element is allowed per package, found {count}")]
    TooManyElements { kind: String, count: usize },

    #[error("Persisted configuration lookup for {kind} {id} failed: {reason}")]
    ConfigLookup {
        kind: String,
        id: String,
        reason: String,
    },

    // Lifecycle contract violations
    #[error("Configuration instance {0} has already been configured")]
    AlreadyConfigured(String),

    #[error("Configuration instance {0} has no configuration set")]
    NoConfigurationSet(String),

    #[error("Only one hosted package may be active: {active} is running, {requested} was rejected")]
    OnlyOneInstanceAllowed { active: String, requested: String },

    #[error("Unknown driver type: {0}")]
    UnknownDriver(String),

    // Entry-point errors
    #[error("Package requires runtime feature {0}, which the host does not provide")]
    MissingRuntimeFeature(String),

    #[error("Framework version {found} is not supported (supported: {supported})")]
    UnsupportedFrameworkVersion { found: String, supported: String },

    #[error("Entry point invocation failed: {0}")]
    InvocationFailure(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl HostError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a persisted-configuration lookup error
    pub fn lookup(kind: impl Into<String>, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLookup {
            kind: kind.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Contract violations and classified entry-point failures never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Thinning { .. } | Self::ConfigLookup { .. }
        )
    }

    /// Whether this error is a programming-contract violation by the caller
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::AlreadyConfigured(_) | Self::NoConfigurationSet(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingLibrary { .. } => {
                Some("Redeploy the original archive so its libraries are re-extracted")
            }
            Self::OnlyOneInstanceAllowed { .. } => {
                Some("Uninstall the active package before installing another one")
            }
            Self::UnsupportedFrameworkVersion { .. } => {
                Some("Adjust [framework] supported_versions or rebuild the package")
            }
            Self::ConfigInvalid { .. } => Some("Run: fathost config init --force"),
            _ => None,
        }
    }
}
