use std::{error::Error, path::Path};

use clap::Parser;
use energy_warehouse::{
    config::EtlConfig,
    warehouse::{duckdb_store::WarehouseSession, energy::reset},
};
use log::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,
}

/// Drop all the warehouse tables and recreate them empty.  Surrogate keys
/// start again from 1.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str()))?;
    let config = EtlConfig::from_env()?;

    let session = WarehouseSession::open(&config.duckdb_path)?;
    reset(&session)?;
    info!("{} reset", config.duckdb_path);
    Ok(())
}
