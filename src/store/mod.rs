//! Shared library cache
//!
//! Libraries hoisted out of fat archives are cached by content hash so that
//! every hosted package reuses the same extracted copy.
//!
//! # Lookup Order
//!
//! | Tier | Root | Access |
//! |------|------|--------|
//! | 1 | shared (optional, skipped when absent) | read-only |
//! | 2 | `<work_area>/lib.index.cache` | read-write |

pub mod index;
pub mod library;

pub use index::{parse_index, read_index_file, render_index, LibraryReference, INDEX_ENTRY};
pub use library::{hash_file, DerivedCache, DerivedCacheDirs, LibraryStore, ResolvedLibrary, StoreTier};
