//! Raw row suppliers.  Each one reads an input file (or API) and hands the
//! warehouse typed rows, see [`crate::warehouse::energy::SourceData`].

pub mod power_generation;
pub mod temperature;
pub mod world_bank;

use std::fs::File;
use std::io::Read;
use std::str::FromStr;

use flate2::read::GzDecoder;
use log::info;
use rust_decimal::Decimal;

use crate::config::EtlConfig;
use crate::error::SourceError;
use crate::warehouse::energy::SourceData;

/// Read a whole file into a string, gunzipping it if the name ends in `.gz`.
pub fn read_file(path: &str) -> Result<String, SourceError> {
    let io_err = |source| SourceError::Io {
        path: path.to_string(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut buffer = String::new();
    if path.ends_with(".gz") {
        GzDecoder::new(file)
            .read_to_string(&mut buffer)
            .map_err(io_err)?;
    } else {
        let mut file = file;
        file.read_to_string(&mut buffer).map_err(io_err)?;
    }
    Ok(buffer)
}

/// Parse a numeric cell.  Empty cells are null.
pub fn parse_decimal(field: &'static str, value: &str) -> Result<Option<Decimal>, SourceError> {
    let v = value.trim();
    if v.is_empty() {
        return Ok(None);
    }
    let v = v.replace(',', "");
    Decimal::from_str(&v)
        .or_else(|_| Decimal::from_scientific(&v))
        .map(Some)
        .map_err(|_| SourceError::BadValue {
            field,
            value: value.to_string(),
        })
}

pub fn parse_year(value: &str) -> Result<i32, SourceError> {
    value.trim().parse::<i32>().map_err(|_| SourceError::BadValue {
        field: "year",
        value: value.to_string(),
    })
}

/// Read every configured input.
pub fn load_sources(config: &EtlConfig) -> Result<SourceData, SourceError> {
    let mut data = SourceData::default();
    if let Some(path) = &config.temperature_csv {
        data.temperatures = temperature::read_temperatures(&read_file(path)?)?;
        info!("{}: {} temperature rows", path, data.temperatures.len());
    }
    if let Some(path) = &config.power_generation_csv {
        data.generation = power_generation::read_generation(&read_file(path)?)?;
        info!("{}: {} generation rows", path, data.generation.len());
    }
    if let Some(path) = &config.renewable_xml {
        data.renewable_output = world_bank::read_renewable_output(&read_file(path)?)?;
        info!("{}: {} renewable output rows", path, data.renewable_output.len());
    }
    if config.world_bank_fetch {
        let client = reqwest::blocking::Client::new();
        let mut records = Vec::new();
        for indicator in world_bank::MIX_INDICATORS {
            records.extend(world_bank::fetch_indicator(
                &client,
                world_bank::API_URL,
                indicator,
            )?);
        }
        data.energy_mix = world_bank::pivot_energy_mix(&records)?;
        info!("world bank: {} energy mix rows", data.energy_mix.len());
    }
    Ok(data)
}
