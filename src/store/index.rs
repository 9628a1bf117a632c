//! Library index file format
//!
//! One `archiveEntryPath=contentHash` pair per line. Both sides are opaque;
//! a line with more than one `=` is rejected because the split cannot tell
//! which `=` separates path from hash.

use crate::error::{HostError, HostResult};
use std::fmt;
use std::path::Path;

/// Entry path of the index embedded in a thinned archive
pub const INDEX_ENTRY: &str = "META-INF/lib.index";

/// A library hoisted out of a fat archive, identified by content hash
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryReference {
    /// Path of the library inside the original archive
    pub entry_path: String,
    /// Content hash of the library bytes
    pub content_hash: String,
}

impl LibraryReference {
    pub fn new(entry_path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            entry_path: entry_path.into(),
            content_hash: content_hash.into(),
        }
    }

    /// File name of the library (last path segment of the entry path)
    pub fn file_name(&self) -> &str {
        self.entry_path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.entry_path)
    }

    /// Parse a single `path=hash` line
    pub fn parse_line(line: &str, line_no: usize) -> HostResult<Self> {
        let parts: Vec<&str> = line.split('=').collect();
        match parts.as_slice() {
            [path, hash] if !path.is_empty() && !hash.is_empty() => Ok(Self::new(*path, *hash)),
            _ => Err(HostError::IndexParse {
                line_no,
                line: line.to_string(),
            }),
        }
    }
}

impl fmt::Display for LibraryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.entry_path, self.content_hash)
    }
}

/// Parse the contents of an index file
pub fn parse_index(content: &str) -> HostResult<Vec<LibraryReference>> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(line_no, line)| LibraryReference::parse_line(line, line_no))
        .collect()
}

/// Render references as index file contents
pub fn render_index(references: &[LibraryReference]) -> String {
    let mut out = String::new();
    for reference in references {
        out.push_str(&reference.to_string());
        out.push('\n');
    }
    out
}

/// Read and parse an index file from disk
pub async fn read_index_file(path: &Path) -> HostResult<Vec<LibraryReference>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| HostError::io(format!("reading index {}", path.display()), e))?;
    parse_index(&content)
}
