//! Archive thinning
//!
//! Splits a fat archive into an app-only archive carrying an embedded
//! library index, with the libraries hoisted into the library store. The
//! byte-level work is done by a [`Thinner`]; this module decides when it
//! runs and maintains the freshness stamp.
//!
//! A thinned archive is fresh iff its modification time equals the source
//! archive's. Modification time is a cheap version stamp, not a content
//! hash: touching the source forces a re-thin, while replacing it with
//! different bytes carrying the same mtime does not.

use crate::error::{HostError, HostResult};
use crate::package::{PackageContents, PackageSource};
use crate::store::{LibraryStore, INDEX_ENTRY};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Inputs handed to a [`Thinner`]
#[derive(Debug, Clone, Copy)]
pub struct ThinRequest<'a> {
    /// Fat archive to read
    pub source: &'a Path,
    /// App-only archive to write, with the index embedded at [`INDEX_ENTRY`]
    pub destination: &'a Path,
    /// Scratch space
    pub work_area: &'a Path,
    /// Shared read-only library root, if any
    pub shared_root: Option<&'a Path>,
}

/// Byte-level archive thinning
pub trait Thinner: Send + Sync {
    /// Write `request.destination` and store every extracted library into
    /// `store`'s writable root (unless already present in either root)
    fn thin(&self, request: &ThinRequest<'_>, store: &LibraryStore) -> HostResult<()>;
}

/// A thinned archive and the source it was produced from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinnedArtifact {
    /// Fat archive
    pub original_path: PathBuf,
    /// Modification time of the fat archive
    pub original_modified: SystemTime,
    /// Entry of the index inside the thinned archive
    pub index_path: String,
    /// App-only archive
    pub thinned_path: PathBuf,
}

impl ThinnedArtifact {
    /// Describe the thinned counterpart of `original` inside `thin_dir`
    pub fn for_source(original: &Path, thin_dir: &Path) -> HostResult<Self> {
        let original_modified = modified(original)?;
        Ok(Self {
            original_path: original.to_path_buf(),
            original_modified,
            index_path: INDEX_ENTRY.to_string(),
            thinned_path: thin_dir.join(thinned_file_name(original)),
        })
    }

    /// Whether the thinned archive exists and carries the source's mtime
    pub fn is_fresh(&self) -> HostResult<bool> {
        if !self.thinned_path.exists() {
            return Ok(false);
        }
        Ok(modified(&self.thinned_path)? == self.original_modified)
    }

    /// Stamp the thinned archive with the source's mtime
    fn stamp(&self) -> HostResult<()> {
        let file = fs::File::options()
            .write(true)
            .open(&self.thinned_path)
            .map_err(|e| {
                HostError::io(format!("opening {}", self.thinned_path.display()), e)
            })?;
        file.set_modified(self.original_modified).map_err(|e| {
            HostError::io(format!("stamping {}", self.thinned_path.display()), e)
        })
    }
}

/// Why a package was not thinned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Loose directory
    Loose,
    /// Archive already carries an index
    AlreadyIndexed,
}

/// Result of [`ThinningPipeline::prepare`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThinOutcome {
    /// The package is deployed as-is
    Skipped(SkipReason),
    /// An existing thinned archive was reused
    Fresh(ThinnedArtifact),
    /// The thinner ran
    Thinned(ThinnedArtifact),
}

impl ThinOutcome {
    /// Source to deploy after thinning
    pub fn deploy_source(&self, original: &PackageSource) -> PackageSource {
        match self {
            Self::Skipped(_) => original.clone(),
            Self::Fresh(artifact) | Self::Thinned(artifact) => {
                PackageSource::Archive(artifact.thinned_path.clone())
            }
        }
    }
}

/// Runs the thinner only when a package needs it
#[derive(Clone)]
pub struct ThinningPipeline {
    thinner: Arc<dyn Thinner>,
    store: LibraryStore,
    work_area: PathBuf,
    thin_dir: PathBuf,
}

impl ThinningPipeline {
    pub fn new(
        thinner: Arc<dyn Thinner>,
        store: LibraryStore,
        work_area: impl Into<PathBuf>,
        thin_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            thinner,
            store,
            work_area: work_area.into(),
            thin_dir: thin_dir.into(),
        }
    }

    /// Thin `source` if it is a fat archive without an index and no fresh
    /// thinned copy exists
    pub fn prepare(
        &self,
        source: &PackageSource,
        contents: &PackageContents,
    ) -> HostResult<ThinOutcome> {
        let PackageSource::Archive(original) = source else {
            debug!("Not thinning {}: loose package", source);
            return Ok(ThinOutcome::Skipped(SkipReason::Loose));
        };

        if contents.has_index()? {
            debug!("Not thinning {}: already in index form", source);
            return Ok(ThinOutcome::Skipped(SkipReason::AlreadyIndexed));
        }

        let artifact = ThinnedArtifact::for_source(original, &self.thin_dir)?;
        if artifact.is_fresh()? {
            debug!(
                "Reusing thinned archive {}",
                artifact.thinned_path.display()
            );
            return Ok(ThinOutcome::Fresh(artifact));
        }

        fs::create_dir_all(&self.thin_dir).map_err(|e| {
            HostError::io(format!("creating {}", self.thin_dir.display()), e)
        })?;

        let request = ThinRequest {
            source: original,
            destination: &artifact.thinned_path,
            work_area: &self.work_area,
            shared_root: self.store.shared_root(),
        };

        if let Err(e) = self.thinner.thin(&request, &self.store) {
            if artifact.thinned_path.exists() {
                if let Err(rm) = fs::remove_file(&artifact.thinned_path) {
                    warn!(
                        "Failed to remove partial thinned archive {}: {}",
                        artifact.thinned_path.display(),
                        rm
                    );
                }
            }
            return Err(e);
        }

        if !artifact.thinned_path.exists() {
            return Err(HostError::Thinning {
                source_archive: original.clone(),
                reason: "thinner produced no destination archive".to_string(),
            });
        }

        artifact.stamp()?;
        info!(
            "Thinned {} into {}",
            original.display(),
            artifact.thinned_path.display()
        );
        Ok(ThinOutcome::Thinned(artifact))
    }
}

fn modified(path: &Path) -> HostResult<SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| HostError::io(format!("reading mtime of {}", path.display()), e))
}

/// `<stem>-<12 hex of the source path hash>.<ext>` so that equally named
/// archives from different directories never share a thinned copy
fn thinned_file_name(original: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(original.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());

    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
    match original.extension() {
        Some(ext) => format!("{stem}-{}.{}", &digest[..12], ext.to_string_lossy()),
        None => format!("{stem}-{}", &digest[..12]),
    }
}
