//! Cache command - inspect and populate the library cache

use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::HostSettings;
use crate::error::{HostError, HostResult};
use crate::store::{read_index_file, LibraryReference, LibraryStore, StoreTier};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, settings: &HostSettings) -> HostResult<()> {
    let store = LibraryStore::new(
        settings.library_root(),
        settings.shared_library_root.clone(),
        settings.derived_root(),
    );

    match args.action {
        CacheAction::Store { file, entry } => store_library(store, file, entry).await,
        CacheAction::Resolve { index, format } => resolve_index(&store, &index, format).await,
        CacheAction::Locate { reference } => locate(&store, &reference),
    }
}

async fn store_library(store: LibraryStore, file: PathBuf, entry: String) -> HostResult<()> {
    if !file.is_file() {
        return Err(HostError::User(format!(
            "Library file not found: {}",
            file.display()
        )));
    }

    let reference = tokio::task::spawn_blocking(move || store.store_file(&file, &entry))
        .await
        .map_err(|e| HostError::Internal(format!("store task failed: {e}")))??;

    // Index line form, ready to append to an index file
    println!("{reference}");
    Ok(())
}

#[derive(Serialize)]
struct Resolution {
    entry: String,
    hash: String,
    tier: Option<StoreTier>,
    path: Option<PathBuf>,
}

async fn resolve_index(store: &LibraryStore, index: &Path, format: OutputFormat) -> HostResult<()> {
    let references = read_index_file(index).await?;
    debug!("{} references in {}", references.len(), index.display());

    let mut rows = Vec::with_capacity(references.len());
    for reference in &references {
        let resolved = store.resolve(reference)?;
        rows.push(Resolution {
            entry: reference.entry_path.clone(),
            hash: reference.content_hash.clone(),
            tier: resolved.as_ref().map(|r| r.tier),
            path: resolved.map(|r| r.path),
        });
    }

    match format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                match &row.path {
                    Some(path) => println!("{}", path.display()),
                    None => println!("MISSING {}", row.entry),
                }
            }
        }
    }

    match rows.iter().find(|row| row.path.is_none()) {
        Some(missing) => Err(HostError::MissingLibrary {
            entry: missing.entry.clone(),
            hash: missing.hash.clone(),
        }),
        None => Ok(()),
    }
}

fn print_table(rows: &[Resolution]) {
    println!("{:<50} {:<10} {}", "ENTRY", "TIER", "PATH");
    println!("{}", "-".repeat(90));

    for row in rows {
        let tier = match row.tier {
            Some(StoreTier::Shared) => style("shared").cyan().to_string(),
            Some(StoreTier::Writable) => style("writable").green().to_string(),
            None => style("missing").red().to_string(),
        };
        let path = row
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("{:<50} {:<10} {}", row.entry, tier, path);
    }

    println!();
    println!("Total: {} librar(y/ies)", rows.len());
}

fn locate(store: &LibraryStore, reference: &str) -> HostResult<()> {
    let reference = LibraryReference::parse_line(reference, 1)?;

    if let Some(shared) = store.shared_root() {
        println!(
            "shared:   {}",
            LibraryStore::location(shared, &reference)?.display()
        );
    }
    println!(
        "writable: {}",
        LibraryStore::location(store.writable_root(), &reference)?.display()
    );
    Ok(())
}
