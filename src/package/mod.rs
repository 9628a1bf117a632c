//! Hosted packages
//!
//! A hosted package is either a fat archive (optionally already thinned into
//! index form) or a loose directory with the same layout. Reading archive
//! entries is delegated to an [`ArchiveReader`] supplied by the host.

pub mod manifest;

pub use manifest::{PackageManifest, MANIFEST_ENTRY};

use crate::assemble::ContainerHandle;
use crate::error::{HostError, HostResult};
use crate::reconcile::ServerOverrides;
use crate::store::{parse_index, LibraryReference, INDEX_ENTRY};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read access to archive entries
///
/// Entry names use `/` separators and are relative to the archive root.
pub trait ArchiveReader: Send + Sync {
    /// Read one entry, `None` when absent
    fn read_entry(&self, archive: &Path, entry: &str) -> HostResult<Option<Vec<u8>>>;

    /// List entry names starting with `prefix`
    fn list_entries(&self, archive: &Path, prefix: &str) -> HostResult<Vec<String>>;
}

/// Where a package's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// A single archive file
    Archive(PathBuf),
    /// An expanded directory
    Loose(PathBuf),
}

impl PackageSource {
    /// Classify an existing path
    pub fn from_path(path: impl Into<PathBuf>) -> HostResult<Self> {
        let path = path.into();
        if path.is_dir() {
            Ok(Self::Loose(path))
        } else if path.is_file() {
            Ok(Self::Archive(path))
        } else {
            Err(HostError::PackageNotFound(path))
        }
    }

    /// Path on disk
    pub fn path(&self) -> &Path {
        match self {
            Self::Archive(path) | Self::Loose(path) => path,
        }
    }

    /// Whether this is an archive (the only form thinning applies to)
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Archive(_))
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive(path) => write!(f, "archive {}", path.display()),
            Self::Loose(path) => write!(f, "directory {}", path.display()),
        }
    }
}

/// A deploy request
#[derive(Debug, Clone)]
pub struct HostedPackage {
    /// Package name, used for the single-active-instance check
    pub name: String,
    /// Package bytes
    pub source: PackageSource,
    /// Arguments for the entry point
    pub args: Vec<String>,
    /// Host-supplied overrides for the package's declared server configuration
    pub overrides: ServerOverrides,
}

impl HostedPackage {
    pub fn new(name: impl Into<String>, source: PackageSource) -> Self {
        Self {
            name: name.into(),
            source,
            args: vec![],
            overrides: ServerOverrides::default(),
        }
    }

    /// Append entry-point arguments
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_overrides(mut self, overrides: ServerOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Readable view over a package's entries
#[derive(Clone)]
pub enum PackageContents {
    /// Expanded directory
    Loose { root: PathBuf },
    /// Archive read through the host's reader
    Archive {
        path: PathBuf,
        reader: Arc<dyn ArchiveReader>,
    },
}

impl fmt::Debug for PackageContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loose { root } => f.debug_struct("Loose").field("root", root).finish(),
            Self::Archive { path, .. } => f.debug_struct("Archive").field("path", path).finish(),
        }
    }
}

impl PackageContents {
    /// Open a package source
    pub fn open(source: &PackageSource, reader: &Arc<dyn ArchiveReader>) -> Self {
        match source {
            PackageSource::Loose(root) => Self::Loose { root: root.clone() },
            PackageSource::Archive(path) => Self::Archive {
                path: path.clone(),
                reader: Arc::clone(reader),
            },
        }
    }

    /// Location on disk
    pub fn location(&self) -> &Path {
        match self {
            Self::Loose { root } => root,
            Self::Archive { path, .. } => path,
        }
    }

    /// Read one entry
    pub fn read(&self, entry: &str) -> HostResult<Option<Vec<u8>>> {
        match self {
            Self::Loose { root } => {
                let path = root.join(entry);
                if !path.is_file() {
                    return Ok(None);
                }
                std::fs::read(&path)
                    .map(Some)
                    .map_err(|e| HostError::io(format!("reading {}", path.display()), e))
            }
            Self::Archive { path, reader } => reader.read_entry(path, entry),
        }
    }

    /// Files directly inside `dir` (which ends in `/`), as sorted entry names
    pub fn list_files(&self, dir: &str) -> HostResult<Vec<String>> {
        let mut entries = match self {
            Self::Loose { root } => {
                let path = root.join(dir);
                if !path.is_dir() {
                    return Ok(vec![]);
                }
                let read = std::fs::read_dir(&path)
                    .map_err(|e| HostError::io(format!("listing {}", path.display()), e))?;

                let mut names = vec![];
                for entry in read {
                    let entry =
                        entry.map_err(|e| HostError::io(format!("listing {}", path.display()), e))?;
                    if entry.path().is_file() {
                        names.push(format!("{dir}{}", entry.file_name().to_string_lossy()));
                    }
                }
                names
            }
            Self::Archive { path, reader } => reader
                .list_entries(path, dir)?
                .into_iter()
                .filter(|name| {
                    name.strip_prefix(dir)
                        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
                })
                .collect(),
        };
        entries.sort();
        Ok(entries)
    }

    /// Container handle for an entry (file or directory) of this package
    pub fn handle(&self, entry: &str) -> ContainerHandle {
        match self {
            Self::Loose { root } => ContainerHandle::Path(root.join(entry.trim_end_matches('/'))),
            Self::Archive { path, .. } => ContainerHandle::ArchiveEntry {
                archive: path.clone(),
                entry: entry.to_string(),
            },
        }
    }

    /// The embedded library index, if the package is in index form
    pub fn index(&self) -> HostResult<Option<Vec<LibraryReference>>> {
        match self.read(INDEX_ENTRY)? {
            Some(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                parse_index(&text).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Whether the package already carries an index
    pub fn has_index(&self) -> HostResult<bool> {
        Ok(self.read(INDEX_ENTRY)?.is_some())
    }

    /// The package manifest, empty when absent
    pub fn manifest(&self) -> HostResult<PackageManifest> {
        Ok(self
            .read(MANIFEST_ENTRY)?
            .map(|bytes| PackageManifest::parse(&String::from_utf8_lossy(&bytes)))
            .unwrap_or_default())
    }
}
