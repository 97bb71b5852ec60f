use std::{error::Error, path::Path};

use clap::Parser;
use energy_warehouse::{
    config::EtlConfig,
    sources::load_sources,
    warehouse::{
        duckdb_store::WarehouseSession,
        energy::{create_schema, run_pipeline, DimensionMode, RunReport},
    },
};
use itertools::Itertools;
use log::{error, info};
use tabled::{builder::Builder, settings::Style};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// Don't reconcile dimensions, load facts against the existing
    /// dimension tables
    #[arg(long, default_value_t = false)]
    reload_dimensions: bool,
}

/// Make an ASCII table from the run report
fn ascii_table(report: &RunReport) -> tabled::Table {
    let mut builder = Builder::new();
    builder.push_record(vec![
        "Table",
        "Rows",
        "Inserted",
        "Matched",
        "Refreshed",
        "Skipped",
    ]);
    for (name, n, stats) in &report.dimensions {
        builder.push_record(vec![
            name.to_string(),
            n.to_string(),
            stats.inserted.to_string(),
            stats.matched.to_string(),
            stats.refreshed.to_string(),
            String::new(),
        ]);
    }
    for (table, load) in &report.facts {
        builder.push_record(vec![
            table.to_string(),
            load.loaded.to_string(),
            String::new(),
            String::new(),
            String::new(),
            load.skipped.to_string(),
        ]);
    }
    for (table, n) in &report.aggregates {
        builder.push_record(vec![
            table.to_string(),
            n.to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ]);
    }
    let mut table = builder.build();
    table.with(Style::empty());
    table
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str()))?;
    let config = EtlConfig::from_env()?;

    let data = load_sources(&config)?;
    let session = WarehouseSession::open(&config.duckdb_path)?;
    create_schema(&session)?;

    let mode = if args.reload_dimensions {
        DimensionMode::Reload
    } else {
        DimensionMode::Reconcile
    };
    let report = match run_pipeline(&session, &data, mode, config.batch_size) {
        Ok(report) => report,
        Err(e) => {
            error!("energy warehouse update failed: {}", e);
            return Err(e.into());
        }
    };

    for (table, load) in &report.facts {
        for (reason, n) in load.skip_reasons.iter().sorted() {
            info!("{}: {} rows skipped, {}", table, n, reason);
        }
    }
    println!("{}", ascii_table(&report));
    Ok(())
}
