//! Content-addressed library store
//!
//! Libraries live at `root/<hash[0..2]>/<hash[2..]>/<file name>`. Lookups try
//! the shared read-only root first, then the writable per-process root.
//! Entries are never evicted.

use crate::error::{HostError, HostResult};
use crate::store::index::LibraryReference;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Which root a library was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreTier {
    /// Shared read-only root
    Shared,
    /// Writable per-process root
    Writable,
}

impl fmt::Display for StoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Writable => write!(f, "writable"),
        }
    }
}

/// A library found in one of the store roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    pub path: PathBuf,
    pub tier: StoreTier,
}

/// Per-library derived cache purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedCache {
    /// Raw container cache
    RawContainer,
    /// Structural adapt cache
    StructuralAdapt,
    /// Overlay cache
    Overlay,
}

impl DerivedCache {
    fn dir_name(&self) -> &'static str {
        match self {
            Self::RawContainer => "raw",
            Self::StructuralAdapt => "adapt",
            Self::Overlay => "overlay",
        }
    }
}

/// The three derived cache directories owned by one resolved library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedCacheDirs {
    pub raw_container: PathBuf,
    pub structural_adapt: PathBuf,
    pub overlay: PathBuf,
}

/// Two-tier content-addressed library cache
#[derive(Debug, Clone)]
pub struct LibraryStore {
    shared_root: Option<PathBuf>,
    writable_root: PathBuf,
    derived_root: PathBuf,
}

impl LibraryStore {
    /// Create a store over a writable root, an optional shared root and
    /// the root under which derived caches are created
    pub fn new(
        writable_root: impl Into<PathBuf>,
        shared_root: Option<PathBuf>,
        derived_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            shared_root,
            writable_root: writable_root.into(),
            derived_root: derived_root.into(),
        }
    }

    /// The writable root
    pub fn writable_root(&self) -> &Path {
        &self.writable_root
    }

    /// The shared root, if configured
    pub fn shared_root(&self) -> Option<&Path> {
        self.shared_root.as_deref()
    }

    /// Cache location of `reference` under `root`.
    ///
    /// Depends only on the content hash and the entry's file name.
    pub fn location(root: &Path, reference: &LibraryReference) -> HostResult<PathBuf> {
        validate_reference(reference)?;
        let (shard, remainder) = reference.content_hash.split_at(2);
        Ok(root.join(shard).join(remainder).join(reference.file_name()))
    }

    /// Resolve a library, shared root first, then the writable root
    pub fn resolve(&self, reference: &LibraryReference) -> HostResult<Option<ResolvedLibrary>> {
        if let Some(shared) = self.shared_root.as_deref().filter(|root| root.is_dir()) {
            let path = Self::location(shared, reference)?;
            if path.exists() {
                debug!("Resolved {} from shared root", reference);
                return Ok(Some(ResolvedLibrary {
                    path,
                    tier: StoreTier::Shared,
                }));
            }
        }

        let path = Self::location(&self.writable_root, reference)?;
        if path.exists() {
            debug!("Resolved {} from writable root", reference);
            return Ok(Some(ResolvedLibrary {
                path,
                tier: StoreTier::Writable,
            }));
        }

        Ok(None)
    }

    /// Resolve a library or fail with `MissingLibrary`
    pub fn require(&self, reference: &LibraryReference) -> HostResult<ResolvedLibrary> {
        self.resolve(reference)?
            .ok_or_else(|| HostError::MissingLibrary {
                entry: reference.entry_path.clone(),
                hash: reference.content_hash.clone(),
            })
    }

    /// Create (if absent) and return a derived cache directory for a
    /// resolved library. Keyed by the library's parent directory name and
    /// file name so that libraries resolved concurrently never share one.
    pub fn derive_cache_dir(&self, library: &Path, purpose: DerivedCache) -> HostResult<PathBuf> {
        let file_name = library.file_name().ok_or_else(|| path_invalid(library))?;
        let parent_name = library
            .parent()
            .and_then(Path::file_name)
            .ok_or_else(|| path_invalid(library))?;

        let dir = self
            .derived_root
            .join(purpose.dir_name())
            .join(parent_name)
            .join(file_name);

        // create_dir_all tolerates a concurrent creator
        fs::create_dir_all(&dir)
            .map_err(|e| HostError::io(format!("creating derived cache {}", dir.display()), e))?;
        Ok(dir)
    }

    /// Create (if absent) every derived cache directory of `library`
    pub fn derive_cache_dirs(&self, library: &Path) -> HostResult<DerivedCacheDirs> {
        Ok(DerivedCacheDirs {
            raw_container: self.derive_cache_dir(library, DerivedCache::RawContainer)?,
            structural_adapt: self.derive_cache_dir(library, DerivedCache::StructuralAdapt)?,
            overlay: self.derive_cache_dir(library, DerivedCache::Overlay)?,
        })
    }

    /// Store a library file into the writable root under its SHA-256 hash.
    ///
    /// Returns the reference for `entry_path`. Storing content that is
    /// already present (in either root) does not copy again.
    pub fn store_file(&self, source: &Path, entry_path: &str) -> HostResult<LibraryReference> {
        let content_hash = hash_file(source)?;
        let reference = LibraryReference::new(entry_path, content_hash);

        if let Some(existing) = self.resolve(&reference)? {
            debug!("Library {} already cached in {} root", reference, existing.tier);
            return Ok(reference);
        }

        let target = Self::location(&self.writable_root, &reference)?;
        let parent = target
            .parent()
            .ok_or_else(|| path_invalid(&target))?;
        fs::create_dir_all(parent)
            .map_err(|e| HostError::io(format!("creating {}", parent.display()), e))?;

        let tmp = parent.join(format!(".{}.{}.tmp", reference.file_name(), Uuid::new_v4()));
        fs::copy(source, &tmp)
            .map_err(|e| HostError::io(format!("copying {} into cache", source.display()), e))?;

        // Rename is atomic; a concurrent store of the same content wins harmlessly
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            if !target.exists() {
                return Err(HostError::io(format!("publishing {}", target.display()), e));
            }
        }

        debug!("Stored {} at {}", reference, target.display());
        Ok(reference)
    }
}

/// SHA-256 of a file's contents as lowercase hex
pub fn hash_file(path: &Path) -> HostResult<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| HostError::io(format!("opening library {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| HostError::io(format!("hashing library {}", path.display()), e))?;
    Ok(hex::encode(hasher.finalize()))
}

fn validate_reference(reference: &LibraryReference) -> HostResult<()> {
    let invalid = |reason: &str| HostError::InvalidLibraryReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    };

    let hash = &reference.content_hash;
    if hash.len() < 3 || !hash.is_ascii() {
        return Err(invalid("content hash must be at least three ASCII characters"));
    }
    if hash.contains(['/', '\\']) || hash.contains("..") {
        return Err(invalid("content hash contains path separators"));
    }

    let name = reference.file_name();
    if !matches!(
        Path::new(name).components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    ) {
        return Err(invalid("entry file name is not a plain file name"));
    }
    Ok(())
}

fn path_invalid(path: &Path) -> HostError {
    HostError::InvalidLibraryReference {
        reference: path.display().to_string(),
        reason: "path has no file name or parent directory".to_string(),
    }
}
