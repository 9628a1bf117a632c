//! Classpath container assembly
//!
//! Builds the ordered container list for a hosted package: primary classes,
//! bundled libraries (from the embedded index via the library store, or
//! enumerated from the lib directory), then framework-supplied support
//! containers. Lookup is first-match-wins over the final order.

use crate::error::HostResult;
use crate::package::{PackageContents, PackageManifest};
use crate::store::{DerivedCacheDirs, LibraryStore};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Opaque reference to a container's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContainerHandle {
    /// File or directory on disk
    Path(PathBuf),
    /// Entry (file or directory) inside an archive
    ArchiveEntry { archive: PathBuf, entry: String },
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::ArchiveEntry { archive, entry } => write!(f, "{}!/{}", archive.display(), entry),
        }
    }
}

/// Role of a container on the classpath
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    PrimaryClasses,
    Library,
    SupportLibrary,
}

/// One classpath container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub kind: ContainerKind,
    pub logical_name: String,
    pub handle: ContainerHandle,
    /// Derived caches, set for libraries resolved from the library store
    pub derived: Option<DerivedCacheDirs>,
}

impl ContainerInfo {
    pub fn new(kind: ContainerKind, logical_name: impl Into<String>, handle: ContainerHandle) -> Self {
        Self {
            kind,
            logical_name: logical_name.into(),
            handle,
            derived: None,
        }
    }

    pub fn with_derived(mut self, derived: DerivedCacheDirs) -> Self {
        self.derived = Some(derived);
        self
    }

    /// A framework-supplied container
    pub fn support(logical_name: impl Into<String>, handle: ContainerHandle) -> Self {
        Self::new(ContainerKind::SupportLibrary, logical_name, handle)
    }
}

/// Ordered container list.
///
/// The first primary-classes or library container pushed ends up with the
/// lowest lookup priority: it is moved past every container pushed after it.
#[derive(Debug, Default)]
pub struct ContainerList {
    entries: Vec<ContainerInfo>,
}

impl ContainerList {
    pub fn push(&mut self, info: ContainerInfo) {
        self.entries.push(info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Final lookup order
    pub fn into_ordered(mut self) -> Vec<ContainerInfo> {
        let first = self.entries.iter().position(|info| {
            matches!(
                info.kind,
                ContainerKind::PrimaryClasses | ContainerKind::Library
            )
        });
        if let Some(index) = first {
            let info = self.entries.remove(index);
            self.entries.push(info);
        }
        self.entries
    }
}

/// Decides which bundled libraries the host framework already provides
pub trait StarterFilter: Send + Sync {
    fn is_provided(&self, file_name: &str) -> bool;
}

/// Filters libraries whose file name starts with any configured prefix
#[derive(Debug, Clone, Default)]
pub struct PrefixStarterFilter {
    prefixes: Vec<String>,
}

impl PrefixStarterFilter {
    pub fn new(prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().collect(),
        }
    }
}

impl StarterFilter for PrefixStarterFilter {
    fn is_provided(&self, file_name: &str) -> bool {
        self.prefixes.iter().any(|p| file_name.starts_with(p.as_str()))
    }
}

/// Builds container lists for hosted packages
#[derive(Clone)]
pub struct ContainerAssembler {
    store: LibraryStore,
    starters: Arc<dyn StarterFilter>,
}

impl ContainerAssembler {
    pub fn new(store: LibraryStore, starters: Arc<dyn StarterFilter>) -> Self {
        Self { store, starters }
    }

    /// Assemble the container list.
    ///
    /// With an embedded index every reference must resolve; one missing
    /// library fails the whole assembly with `MissingLibrary`.
    pub fn assemble(
        &self,
        contents: &PackageContents,
        manifest: &PackageManifest,
        support: Vec<ContainerInfo>,
    ) -> HostResult<Vec<ContainerInfo>> {
        let mut list = ContainerList::default();

        let classes_dir = manifest.classes_dir();
        list.push(ContainerInfo::new(
            ContainerKind::PrimaryClasses,
            classes_dir.trim_end_matches('/'),
            contents.handle(&classes_dir),
        ));

        match contents.index()? {
            Some(index) => {
                for reference in &index {
                    let resolved = self.store.require(reference)?;
                    debug!(
                        "Library {} -> {} ({} root)",
                        reference.entry_path,
                        resolved.path.display(),
                        resolved.tier
                    );
                    let derived = self.store.derive_cache_dirs(&resolved.path)?;
                    list.push(
                        ContainerInfo::new(
                            ContainerKind::Library,
                            reference.entry_path.clone(),
                            ContainerHandle::Path(resolved.path),
                        )
                        .with_derived(derived),
                    );
                }
            }
            None => {
                for entry in contents.list_files(&manifest.lib_dir())? {
                    let file_name = entry.rsplit('/').next().unwrap_or(&entry);
                    if self.starters.is_provided(file_name) {
                        debug!("Skipping framework-provided library {}", entry);
                        continue;
                    }
                    let handle = contents.handle(&entry);
                    list.push(ContainerInfo::new(ContainerKind::Library, entry, handle));
                }
            }
        }

        for info in support {
            list.push(info);
        }

        debug!("Assembled {} containers", list.len());
        Ok(list.into_ordered())
    }
}
