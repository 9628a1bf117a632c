//! Units command - inspect and purge configuration units

use crate::audit::AuditLog;
use crate::cli::args::{OutputFormat, UnitsAction, UnitsArgs};
use crate::config::HostSettings;
use crate::error::HostResult;
use crate::reconcile::TomlModelSerializer;
use crate::unit::{UnitManager, UnitRecord};
use console::style;
use std::sync::Arc;

/// Execute the units command
pub async fn execute(args: UnitsArgs, settings: &HostSettings) -> HostResult<()> {
    let units = UnitManager::new(
        settings.units_dir.clone(),
        settings.start_level,
        Arc::new(TomlModelSerializer),
    );

    match args.action {
        UnitsAction::List { format } => list_units(&units, format).await,
        UnitsAction::Purge => purge_units(&units, settings).await,
    }
}

async fn list_units(units: &UnitManager, format: OutputFormat) -> HostResult<()> {
    let records = units.discover().await?;

    if records.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!("No configuration units found."),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(&records),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Plain => {
            for record in &records {
                println!("{}", record.name);
            }
        }
    }
    Ok(())
}

fn print_table(records: &[UnitRecord]) {
    println!(
        "{:<36} {:<10} {:<8} {:<18} {}",
        style("NAME").bold(),
        style("INSTANCE").bold(),
        style("LEVEL").bold(),
        style("CREATED").bold(),
        style("ELEMENTS").bold()
    );
    println!("{}", "-".repeat(90));

    for record in records {
        let elements: Vec<&str> = record.model.element_ids().into_iter().map(|(_, id)| id).collect();
        println!(
            "{:<36} {:<10} {:<8} {:<18} {}",
            record.name,
            record.tag.instance_id,
            record.start_level,
            record.created_at.format("%Y-%m-%d %H:%M"),
            elements.join(", ")
        );
    }

    println!();
    println!("{} unit(s)", records.len());
}

async fn purge_units(units: &UnitManager, settings: &HostSettings) -> HostResult<()> {
    let purged = units.purge().await?;
    AuditLog::new(settings)
        .log(
            "units.purged",
            &serde_json::json!({ "count": purged.len(), "source": "cli" }),
        )
        .await;

    println!(
        "{} Purged {} configuration unit(s)",
        style("✓").green().bold(),
        purged.len()
    );
    Ok(())
}
