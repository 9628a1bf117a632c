//! fathost - fat application host
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use fathost::cli::{commands, Cli, Commands};
use fathost::config::{ConfigManager, HostSettings};
use fathost::error::HostResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> HostResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Config is loaded before logging so the format setting applies to the whole run
    let config = manager.load().await?;
    init_logging(cli.verbose, &config.general.log_format);
    debug!("Using configuration {}", manager.path().display());

    match cli.command {
        Commands::Config(args) => commands::config(args, &config, &manager).await,
        Commands::Cache(args) => {
            let settings = HostSettings::from_config(&config)?;
            commands::cache(args, &settings).await
        }
        Commands::Units(args) => {
            let settings = HostSettings::from_config(&config)?;
            commands::units(args, &settings).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("fathost=warn"),
        1 => EnvFilter::new("fathost=info"),
        _ => EnvFilter::new("fathost=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if format == "json" {
        builder.json().init();
    } else {
        builder.with_target(false).without_time().init();
    }
}
