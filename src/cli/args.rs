//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// fathost - host fat application archives with a shared library cache
#[derive(Parser, Debug)]
#[command(name = "fathost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FATHOST_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Inspect and populate the library cache
    Cache(CacheArgs),

    /// Inspect configuration units
    Units(UnitsArgs),
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Hash a library and store it in the writable cache root
    Store {
        /// Library file
        file: PathBuf,

        /// In-archive entry path the library was extracted from
        #[arg(short, long)]
        entry: String,
    },

    /// Resolve every reference of an index file
    Resolve {
        /// Index file (`path=hash` per line)
        index: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the cache location of one `path=hash` reference
    Locate {
        /// Reference in index line form
        reference: String,
    },
}

/// Arguments for the units command
#[derive(Parser, Debug)]
pub struct UnitsArgs {
    /// Subcommand for units
    #[command(subcommand)]
    pub action: UnitsAction,
}

/// Units subcommands
#[derive(Subcommand, Debug)]
pub enum UnitsAction {
    /// List configuration units on disk
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove every configuration unit
    Purge,
}
