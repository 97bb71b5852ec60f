use log::info;

use crate::error::RebuildError;

use super::schema::AggregateSpec;
use super::store::Warehouse;

/// Recompute every aggregate derived from `fact_table`, one at a time.  Each
/// rebuild is a delete plus a full group-by insert in a single transaction,
/// so a failure leaves the previous contents of that aggregate in place and
/// never writes to the base table.
pub fn rebuild_aggregates<W: Warehouse + ?Sized>(
    store: &W,
    fact_table: &str,
    aggregates: &[AggregateSpec],
) -> Result<Vec<(&'static str, usize)>, RebuildError> {
    let mut out = Vec::new();
    for aggregate in aggregates.iter().filter(|a| a.source == fact_table) {
        let n = store
            .rebuild_aggregate(aggregate)
            .map_err(|source| RebuildError {
                table: aggregate.table.to_string(),
                source,
            })?;
        info!("rebuilt {} from {}: {} rows", aggregate.table, fact_table, n);
        out.push((aggregate.table, n));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::warehouse::duckdb_store::WarehouseSession;
    use crate::warehouse::energy::{
        aggregates, create_schema, date_dimension, fuel_dimension, fuel_generation_fact,
        temperature_dimension,
    };
    use crate::warehouse::keys::{NaturalKey, Scalar};
    use crate::warehouse::loader::{load_facts, FactRow};
    use crate::warehouse::mapping::DimensionMappings;
    use crate::warehouse::reconciler::{reconcile_dimension, DimensionEntry};
    use crate::warehouse::schema::Column;

    fn load_base(session: &WarehouseSession) -> Result<(), Box<dyn Error>> {
        let mut mappings = DimensionMappings::new();
        let year = vec![DimensionEntry::new(NaturalKey::year(2020))];
        mappings.insert(reconcile_dimension(session, &date_dimension(), &year)?.0);
        let temp = vec![DimensionEntry::with_attributes(
            NaturalKey::year(2020),
            vec![Scalar::Decimal(dec!(27.9))],
        )];
        mappings.insert(reconcile_dimension(session, &temperature_dimension(), &temp)?.0);
        let fuels: Vec<DimensionEntry> = ["Coal", "Hydro", "Solar"]
            .into_iter()
            .map(|f| DimensionEntry::new(NaturalKey::single(f)))
            .collect();
        mappings.insert(reconcile_dimension(session, &fuel_dimension(), &fuels)?.0);

        let rows: Vec<FactRow> = [("Coal", dec!(100)), ("Hydro", dec!(50)), ("Solar", dec!(7.5))]
            .into_iter()
            .map(|(fuel, v)| FactRow {
                keys: vec![
                    NaturalKey::year(2020),
                    NaturalKey::single(fuel),
                    NaturalKey::year(2020),
                ],
                measures: vec![Some(v)],
            })
            .collect();
        load_facts(session, &fuel_generation_fact(), &mappings, &rows, 100)?;
        Ok(())
    }

    fn totals(session: &WarehouseSession) -> Result<Vec<(String, Decimal)>, Box<dyn Error>> {
        let mut stmt = session.connection().prepare(
            r#"
SELECT is_renewable, total_gen_gwh::VARCHAR
FROM fact_renew_vs_nonrenew
ORDER BY is_renewable;
"#,
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<usize, String>(0)?, row.get::<usize, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::new();
        for (flag, v) in rows {
            out.push((flag, v.parse::<Decimal>()?));
        }
        Ok(out)
    }

    #[test]
    fn renewable_split() -> Result<(), Box<dyn Error>> {
        let session = WarehouseSession::open_in_memory()?;
        create_schema(&session)?;
        load_base(&session)?;
        let rebuilt = rebuild_aggregates(&session, "fuel_generation", &aggregates())?;
        assert_eq!(rebuilt, vec![("fact_renew_vs_nonrenew", 2), ("fact_energy_mix", 3)]);
        assert_eq!(
            totals(&session)?,
            vec![("N".to_string(), dec!(100)), ("Y".to_string(), dec!(57.5))]
        );

        // a second rebuild replaces, it does not add up
        rebuild_aggregates(&session, "fuel_generation", &aggregates())?;
        assert_eq!(totals(&session)?.len(), 2);

        let (base, mix): (String, String) = session.connection().query_row(
            r#"
SELECT
    (SELECT SUM(pow_gen_gwh) FROM fuel_generation)::VARCHAR,
    (SELECT SUM(total_gen_gwh) FROM fact_energy_mix)::VARCHAR;
"#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!(base.parse::<Decimal>()?, mix.parse::<Decimal>()?);
        Ok(())
    }

    #[test]
    fn failed_rebuild_keeps_base_and_old_rows() -> Result<(), Box<dyn Error>> {
        let session = WarehouseSession::open_in_memory()?;
        create_schema(&session)?;
        load_base(&session)?;
        rebuild_aggregates(&session, "fuel_generation", &aggregates())?;

        let broken = AggregateSpec {
            table: "fact_renew_vs_nonrenew",
            source: "fuel_generation",
            columns: vec![
                Column::new("date_key", "BIGINT"),
                Column::new("is_renewable", "CHAR(1)"),
                Column::new("total_gen_gwh", "DECIMAL(18,3)"),
            ],
            key_columns: vec!["date_key", "is_renewable"],
            select: "SELECT date_key, 'Y', pow_gen_gwh FROM no_such_table".to_string(),
        };
        let res = rebuild_aggregates(&session, "fuel_generation", &[broken]);
        assert!(matches!(res, Err(RebuildError { .. })));
        assert_eq!(totals(&session)?.len(), 2);
        let n: i64 = session.connection().query_row(
            "SELECT COUNT(*) FROM fuel_generation",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(n, 3);
        Ok(())
    }

    #[test]
    fn only_aggregates_of_the_given_fact() -> Result<(), Box<dyn Error>> {
        let session = WarehouseSession::open_in_memory()?;
        create_schema(&session)?;
        assert!(rebuild_aggregates(&session, "renewable_output", &aggregates())?.is_empty());
        Ok(())
    }
}
