use std::env;

use crate::error::ConfigError;

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Where a run reads its inputs from and writes its output to.
#[derive(Debug, Clone, PartialEq)]
pub struct EtlConfig {
    pub duckdb_path: String,
    pub temperature_csv: Option<String>,
    pub power_generation_csv: Option<String>,
    pub renewable_xml: Option<String>,
    /// Fetch the energy mix indicators from the World Bank API.
    pub world_bank_fetch: bool,
    pub batch_size: usize,
}

impl EtlConfig {
    /// Read the configuration from the process environment.  Load the
    /// `.env/<env>.env` file with `dotenvy` first.
    pub fn from_env() -> Result<EtlConfig, ConfigError> {
        EtlConfig::from_vars(|name| env::var(name).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<EtlConfig, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let optional = |name: &'static str| var(name).filter(|v| !v.trim().is_empty());

        let duckdb_path =
            optional("ENERGY_DUCKDB_PATH").ok_or(ConfigError::Missing("ENERGY_DUCKDB_PATH"))?;

        let world_bank_fetch = match optional("WORLD_BANK_FETCH") {
            None => false,
            Some(v) => match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "WORLD_BANK_FETCH",
                        value: v,
                    })
                }
            },
        };

        let batch_size = match optional("ETL_BATCH_SIZE") {
            None => DEFAULT_BATCH_SIZE,
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "ETL_BATCH_SIZE",
                        value: v,
                    })
                }
            },
        };

        Ok(EtlConfig {
            duckdb_path,
            temperature_csv: optional("TEMPERATURE_CSV"),
            power_generation_csv: optional("POWER_GENERATION_CSV"),
            renewable_xml: optional("RENEWABLE_XML"),
            world_bank_fetch,
            batch_size,
        })
    }
}
