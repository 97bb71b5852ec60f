//! The energy warehouse: yearly power generation by fuel, renewable output
//! and energy mix shares by country, and yearly mean temperature.


use itertools::Itertools;
use log::{info, warn};
use rust_decimal::Decimal;

use crate::error::{EtlError, ResolutionError, StoreError};
use crate::utils::lib_duckdb::{RetryPolicy, WithRetry};

use super::aggregates::rebuild_aggregates;
use super::duckdb_store::WarehouseSession;
use super::keys::{KeyPart, NaturalKey, Normalize, Scalar};
use super::loader::{load_facts, FactRow, LoadReport};
use super::mapping::DimensionMappings;
use super::reconciler::{reconcile_dimension, reload_mapping, DimensionEntry, ReconcileStats};
use super::schema::{
    AggregateSpec, Column, Derivation, DimensionSpec, FactDimension, FactSpec, KeyColumn,
    MatchRule, Measure, RefreshPolicy,
};
use super::store::Warehouse;

/// Fuels of the national power generation report.  Always present in the fuel
/// dimension, whether or not a source mentions them.
pub const DEFAULT_FUELS: [&str; 8] = [
    "Biomass",
    "Coal",
    "Geothermal",
    "Hydro",
    "Natural Gas",
    "Oil-based",
    "Solar",
    "Wind",
];

/// Country the national power generation report is about.
pub const HOME_COUNTRY: (&str, &str) = ("PH", "Philippines");

pub fn date_dimension() -> DimensionSpec {
    DimensionSpec {
        name: "date",
        table: "dim_date",
        key_column: "date_key",
        sequence: "seq_dim_date",
        natural_key: vec![KeyColumn::int("calendar_year")],
        attributes: vec![],
        match_rule: MatchRule::AllFields,
        policy: RefreshPolicy::InsertOnly,
        derivation: Derivation::Supplied,
    }
}

/// Countries match on code OR name.  Sources disagree on which of the two
/// they supply (2 vs 3 letter codes, missing names).
pub fn geo_dimension() -> DimensionSpec {
    DimensionSpec {
        name: "geo",
        table: "dim_geo",
        key_column: "geo_key",
        sequence: "seq_dim_geo",
        natural_key: vec![
            KeyColumn::text("country_code", "VARCHAR(3)", Normalize::TrimUpper),
            KeyColumn::text("country_name", "VARCHAR(100)", Normalize::TrimFold),
        ],
        attributes: vec![Column::new("region_grp", "VARCHAR(50)")],
        match_rule: MatchRule::AnyField,
        policy: RefreshPolicy::InsertOnly,
        derivation: Derivation::Supplied,
    }
}

pub fn fuel_dimension() -> DimensionSpec {
    DimensionSpec {
        name: "fuel",
        table: "dim_fuel_source",
        key_column: "fuel_key",
        sequence: "seq_dim_fuel_source",
        natural_key: vec![KeyColumn::text(
            "fuel_name",
            "VARCHAR(50)",
            Normalize::TrimFold,
        )],
        attributes: vec![
            Column::new("is_renewable", "CHAR(1)"),
            Column::new("energy_categ", "VARCHAR(20)"),
        ],
        match_rule: MatchRule::AllFields,
        policy: RefreshPolicy::InsertOnly,
        derivation: Derivation::FuelClassification,
    }
}

pub fn temperature_dimension() -> DimensionSpec {
    DimensionSpec {
        name: "temperature",
        table: "dim_temp",
        key_column: "temp_key",
        sequence: "seq_dim_temp",
        natural_key: vec![KeyColumn::int("year")],
        attributes: vec![Column::new("avg_mean_temp_deg_c", "DECIMAL(5,2)")],
        match_rule: MatchRule::AllFields,
        policy: RefreshPolicy::RefreshAttributes,
        derivation: Derivation::Supplied,
    }
}

pub fn dimensions() -> Vec<DimensionSpec> {
    vec![
        date_dimension(),
        geo_dimension(),
        fuel_dimension(),
        temperature_dimension(),
    ]
}

fn dim(dimension: &'static str, column: &'static str) -> FactDimension {
    FactDimension { dimension, column }
}

fn share(column: &'static str) -> Measure {
    Measure {
        column,
        sql_type: "DECIMAL(18,15)",
        required: false,
    }
}

pub fn fuel_generation_fact() -> FactSpec {
    FactSpec {
        table: "fuel_generation",
        dimensions: vec![
            dim("date", "date_key"),
            dim("fuel", "fuel_key"),
            dim("temperature", "temp_key"),
        ],
        measures: vec![Measure {
            column: "pow_gen_gwh",
            sql_type: "DECIMAL(18,3)",
            required: true,
        }],
    }
}

pub fn renewable_output_fact() -> FactSpec {
    FactSpec {
        table: "renewable_output",
        dimensions: vec![
            dim("date", "date_key"),
            dim("geo", "geo_key"),
            dim("temperature", "temp_key"),
        ],
        measures: vec![Measure {
            column: "renew_out_pct",
            sql_type: "DECIMAL(18,15)",
            required: true,
        }],
    }
}

/// Electricity production shares by source, as fractions of 1.  A country
/// rarely reports every source, so all measures are nullable.
pub fn energy_mix_fact() -> FactSpec {
    FactSpec {
        table: "energy_mix",
        dimensions: vec![dim("date", "date_key"), dim("geo", "geo_key")],
        measures: vec![
            share("coal"),
            share("hydro"),
            share("natural_gas"),
            share("nuclear"),
            share("oil"),
            share("renewable"),
        ],
    }
}

pub fn facts() -> Vec<FactSpec> {
    vec![
        fuel_generation_fact(),
        renewable_output_fact(),
        energy_mix_fact(),
    ]
}

pub fn aggregates() -> Vec<AggregateSpec> {
    vec![
        AggregateSpec {
            table: "fact_renew_vs_nonrenew",
            source: "fuel_generation",
            columns: vec![
                Column::new("date_key", "BIGINT"),
                Column::new("is_renewable", "CHAR(1)"),
                Column::new("total_gen_gwh", "DECIMAL(18,3)"),
            ],
            key_columns: vec!["date_key", "is_renewable"],
            select: r#"
SELECT f.date_key, d.is_renewable, SUM(f.pow_gen_gwh)::DECIMAL(18,3)
FROM fuel_generation f
JOIN dim_fuel_source d ON f.fuel_key = d.fuel_key
GROUP BY f.date_key, d.is_renewable"#
                .to_string(),
        },
        AggregateSpec {
            table: "fact_energy_mix",
            source: "fuel_generation",
            columns: vec![
                Column::new("date_key", "BIGINT"),
                Column::new("fuel_key", "BIGINT"),
                Column::new("total_gen_gwh", "DECIMAL(18,3)"),
            ],
            key_columns: vec!["date_key", "fuel_key"],
            select: r#"
SELECT f.date_key, f.fuel_key, SUM(f.pow_gen_gwh)::DECIMAL(18,3)
FROM fuel_generation f
GROUP BY f.date_key, f.fuel_key"#
                .to_string(),
        },
    ]
}

/// Create all warehouse tables if they don't exist yet.
pub fn create_schema(session: &WarehouseSession) -> Result<(), StoreError> {
    let mut sql = String::new();
    for d in dimensions() {
        sql.push_str(&d.ddl());
    }
    for f in facts() {
        sql.push_str(&f.ddl());
    }
    for a in aggregates() {
        sql.push_str(&a.ddl());
    }
    session
        .connection()
        .execute_batch_with_retry(&sql, RetryPolicy::default())?;
    Ok(())
}

/// Drop every warehouse table and key sequence, then recreate them empty.
/// Never part of a normal run.
pub fn reset(session: &WarehouseSession) -> Result<(), StoreError> {
    info!("resetting energy warehouse ...");
    let mut sql = String::new();
    for a in aggregates() {
        sql.push_str(&format!("DROP TABLE IF EXISTS {};\n", a.table));
    }
    for f in facts() {
        sql.push_str(&format!("DROP TABLE IF EXISTS {};\n", f.table));
    }
    for d in dimensions() {
        sql.push_str(&format!(
            "DROP TABLE IF EXISTS {};\nDROP SEQUENCE IF EXISTS {};\n",
            d.table, d.sequence
        ));
    }
    session
        .connection()
        .execute_batch_with_retry(&sql, RetryPolicy::default())?;
    create_schema(session)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureRow {
    pub year: i32,
    pub avg_mean_temp_deg_c: Option<Decimal>,
}

/// Yearly generation of one fuel, in GWh.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRow {
    pub year: i32,
    pub fuel: String,
    pub gwh: Option<Decimal>,
}

/// Renewable electricity output, % of total output.
#[derive(Debug, Clone, PartialEq)]
pub struct RenewableOutputRow {
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub year: i32,
    pub value: Option<Decimal>,
}

/// Share of electricity production by source, fractions of 1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnergyMixRow {
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub year: i32,
    pub coal: Option<Decimal>,
    pub hydro: Option<Decimal>,
    pub natural_gas: Option<Decimal>,
    pub nuclear: Option<Decimal>,
    pub oil: Option<Decimal>,
    pub renewable: Option<Decimal>,
}

/// Everything the raw row suppliers produced for one run.
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub temperatures: Vec<TemperatureRow>,
    pub generation: Vec<GenerationRow>,
    pub renewable_output: Vec<RenewableOutputRow>,
    pub energy_mix: Vec<EnergyMixRow>,
}

impl SourceData {
    /// Distinct years across all sources, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.temperatures
            .iter()
            .map(|r| r.year)
            .chain(self.generation.iter().map(|r| r.year))
            .chain(self.renewable_output.iter().map(|r| r.year))
            .chain(self.energy_mix.iter().map(|r| r.year))
            .sorted()
            .dedup()
            .collect()
    }
}

fn geo_key(code: &Option<String>, name: &Option<String>) -> NaturalKey {
    NaturalKey(vec![
        code.clone().map(KeyPart::Text),
        name.clone().map(KeyPart::Text),
    ])
}

/// How the dimensions are made available to the fact loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionMode {
    /// Reconcile every dimension against the sources first.
    Reconcile,
    /// Use the dimension tables as they are.  Facts referencing values not
    /// yet in a dimension are skipped.
    Reload,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub dimensions: Vec<(&'static str, usize, ReconcileStats)>,
    pub facts: Vec<(&'static str, LoadReport)>,
    pub aggregates: Vec<(&'static str, usize)>,
}

fn dimension_entries(data: &SourceData) -> Vec<(DimensionSpec, Vec<DimensionEntry>)> {
    let dates: Vec<DimensionEntry> = data
        .years()
        .into_iter()
        .map(|y| DimensionEntry::new(NaturalKey::year(y)))
        .collect();

    let home = (
        Some(HOME_COUNTRY.0.to_string()),
        Some(HOME_COUNTRY.1.to_string()),
    );
    let geo: Vec<DimensionEntry> = std::iter::once(home)
        .chain(
            data.renewable_output
                .iter()
                .map(|r| (r.country_code.clone(), r.country_name.clone())),
        )
        .chain(
            data.energy_mix
                .iter()
                .map(|r| (r.country_code.clone(), r.country_name.clone())),
        )
        .unique()
        .filter(|(code, name)| {
            let blank = |s: &Option<String>| s.as_deref().map_or(true, |s| s.trim().is_empty());
            if blank(code) && blank(name) {
                warn!("dropping country with neither code nor name");
                return false;
            }
            true
        })
        .map(|(code, name)| DimensionEntry::new(geo_key(&code, &name)))
        .collect();

    let fuels: Vec<DimensionEntry> = DEFAULT_FUELS
        .iter()
        .map(|f| f.to_string())
        .chain(data.generation.iter().map(|r| r.fuel.trim().to_string()))
        .filter(|f| !f.is_empty())
        .unique()
        .map(|f| DimensionEntry::new(NaturalKey::single(f)))
        .collect();

    let temperatures: Vec<DimensionEntry> = data
        .temperatures
        .iter()
        .map(|r| {
            DimensionEntry::with_attributes(
                NaturalKey::year(r.year),
                vec![Scalar::from(r.avg_mean_temp_deg_c)],
            )
        })
        .collect();

    vec![
        (date_dimension(), dates),
        (geo_dimension(), geo),
        (fuel_dimension(), fuels),
        (temperature_dimension(), temperatures),
    ]
}

fn fact_rows(data: &SourceData) -> Vec<(FactSpec, Vec<FactRow>)> {
    let generation = data
        .generation
        .iter()
        .map(|r| FactRow {
            keys: vec![
                NaturalKey::year(r.year),
                NaturalKey::single(r.fuel.as_str()),
                NaturalKey::year(r.year),
            ],
            measures: vec![r.gwh],
        })
        .collect();

    let renewable = data
        .renewable_output
        .iter()
        .map(|r| FactRow {
            keys: vec![
                NaturalKey::year(r.year),
                geo_key(&r.country_code, &r.country_name),
                NaturalKey::year(r.year),
            ],
            measures: vec![r.value],
        })
        .collect();

    let mix = data
        .energy_mix
        .iter()
        .map(|r| FactRow {
            keys: vec![
                NaturalKey::year(r.year),
                geo_key(&r.country_code, &r.country_name),
            ],
            measures: vec![r.coal, r.hydro, r.natural_gas, r.nuclear, r.oil, r.renewable],
        })
        .collect();

    vec![
        (fuel_generation_fact(), generation),
        (renewable_output_fact(), renewable),
        (energy_mix_fact(), mix),
    ]
}

/// Rebuild the key mappings of all dimensions from the dimension tables.
pub fn reload_mappings<W: Warehouse + ?Sized>(
    store: &W,
) -> Result<DimensionMappings, ResolutionError> {
    let mut mappings = DimensionMappings::new();
    for d in dimensions() {
        mappings.insert(reload_mapping(store, &d)?);
    }
    Ok(mappings)
}

/// One complete run: dimensions, then facts, then aggregates.  Re-running
/// with the same data leaves the warehouse unchanged.
pub fn run_pipeline<W: Warehouse + ?Sized>(
    store: &W,
    data: &SourceData,
    mode: DimensionMode,
    batch_size: usize,
) -> Result<RunReport, EtlError> {
    let mut report = RunReport::default();

    let mappings = match mode {
        DimensionMode::Reconcile => {
            let mut mappings = DimensionMappings::new();
            for (dimension, entries) in dimension_entries(data) {
                let (mapping, stats) = reconcile_dimension(store, &dimension, &entries)?;
                report.dimensions.push((dimension.name, mapping.len(), stats));
                mappings.insert(mapping);
            }
            mappings
        }
        DimensionMode::Reload => {
            let mappings = reload_mappings(store)?;
            for d in dimensions() {
                let n = mappings.get(d.name).map_or(0, |m| m.len());
                report.dimensions.push((d.name, n, ReconcileStats::default()));
            }
            mappings
        }
    };

    for (fact, rows) in fact_rows(data) {
        let loaded = load_facts(store, &fact, &mappings, &rows, batch_size)?;
        report.facts.push((fact.table, loaded));
    }

    report.aggregates = rebuild_aggregates(store, "fuel_generation", &aggregates())?;
    info!("energy warehouse run done");
    Ok(report)
}
