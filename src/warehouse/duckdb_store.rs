use duckdb::{
    params, params_from_iter,
    types::{ToSql, ToSqlOutput, Value},
    AccessMode, Connection,
};
use log::{debug, warn};

use crate::error::StoreError;
use crate::utils::lib_duckdb::{open_with_retry, RetryPolicy};

use super::keys::{KeyPart, NaturalKey, Scalar, SurrogateKey};
use super::schema::{AggregateSpec, ColumnKind, DimensionSpec, FactSpec, MatchRule};
use super::store::{ResolvedFact, Warehouse};

/// Decimals go over the wire as text and get cast to the column type in SQL,
/// so no precision is lost on the way in.
impl ToSql for Scalar {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Scalar::Null => ToSqlOutput::Owned(Value::Null),
            Scalar::Int(v) => ToSqlOutput::Owned(Value::BigInt(*v)),
            Scalar::Decimal(d) => ToSqlOutput::Owned(Value::Text(d.to_string())),
            Scalar::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
        })
    }
}

/// A run's connection to the warehouse.  The connection is released when the
/// session is dropped.
pub struct WarehouseSession {
    conn: Connection,
}

impl WarehouseSession {
    /// Open a DuckDB file for writing, retrying while another process holds
    /// the lock.
    pub fn open(duckdb_path: &str) -> Result<WarehouseSession, StoreError> {
        let conn = open_with_retry(duckdb_path, AccessMode::ReadWrite, RetryPolicy::default())?;
        Ok(WarehouseSession { conn })
    }

    pub fn open_in_memory() -> Result<WarehouseSession, StoreError> {
        Ok(WarehouseSession {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction.  Rolls back if `f` fails.
    fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.conn.execute_batch("BEGIN TRANSACTION;")?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(re) = self.conn.execute_batch("ROLLBACK;") {
                    warn!("rollback failed: {}", re);
                }
                Err(e)
            }
        }
    }
}

fn key_params(key: &NaturalKey) -> Vec<Scalar> {
    key.parts()
        .iter()
        .map(|p| match p {
            Some(p) => Scalar::from(p.clone()),
            None => Scalar::Null,
        })
        .collect()
}

impl Warehouse for WarehouseSession {
    fn lookup(
        &self,
        dimension: &DimensionSpec,
        key: &NaturalKey,
    ) -> Result<Option<SurrogateKey>, StoreError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Scalar> = Vec::new();
        for (col, part) in dimension.natural_key.iter().zip(key.parts()) {
            match (part, dimension.match_rule) {
                (Some(part), _) if col.caseless() => {
                    clauses.push(format!("lower({}) = lower(?)", col.name));
                    values.push(Scalar::from(part.clone()));
                }
                (Some(part), _) => {
                    clauses.push(format!("{} = ?", col.name));
                    values.push(Scalar::from(part.clone()));
                }
                (None, MatchRule::AllFields) => clauses.push(format!("{} IS NULL", col.name)),
                (None, MatchRule::AnyField) => {}
            }
        }
        if clauses.is_empty() {
            return Ok(None);
        }
        let joiner = match dimension.match_rule {
            MatchRule::AllFields => " AND ",
            MatchRule::AnyField => " OR ",
        };
        let sql = format!(
            "SELECT {key} FROM {table} WHERE {filter} ORDER BY {key} LIMIT 1;",
            key = dimension.key_column,
            table = dimension.table,
            filter = clauses.join(joiner),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let found = match rows.next()? {
            Some(row) => Some(SurrogateKey(row.get(0)?)),
            None => None,
        };
        Ok(found)
    }

    fn insert_returning_key(
        &self,
        dimension: &DimensionSpec,
        key: &NaturalKey,
        attributes: &[Scalar],
    ) -> Result<SurrogateKey, StoreError> {
        let mut columns: Vec<&str> = dimension.natural_key.iter().map(|c| c.name).collect();
        let mut placeholders: Vec<String> = vec!["?".to_string(); columns.len()];
        let mut values = key_params(key);
        for (idx, col) in dimension.attributes.iter().enumerate() {
            columns.push(col.name);
            placeholders.push(format!("CAST(? AS {})", col.sql_type));
            values.push(attributes.get(idx).cloned().unwrap_or(Scalar::Null));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {};",
            dimension.table,
            columns.join(", "),
            placeholders.join(", "),
            dimension.key_column
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let sk = match rows.next()? {
            Some(row) => SurrogateKey(row.get(0)?),
            None => {
                return Err(StoreError::NoKeyReturned {
                    table: dimension.table.to_string(),
                })
            }
        };
        Ok(sk)
    }

    fn refresh_attributes(
        &self,
        dimension: &DimensionSpec,
        sk: SurrogateKey,
        attributes: &[Scalar],
    ) -> Result<(), StoreError> {
        if dimension.attributes.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = dimension
            .attributes
            .iter()
            .map(|c| format!("{} = CAST(? AS {})", c.name, c.sql_type))
            .collect();
        let mut values: Vec<Scalar> = (0..dimension.attributes.len())
            .map(|idx| attributes.get(idx).cloned().unwrap_or(Scalar::Null))
            .collect();
        values.push(Scalar::Int(sk.0));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?;",
            dimension.table,
            assignments.join(", "),
            dimension.key_column
        );
        let n = self.conn.execute(&sql, params_from_iter(values))?;
        if n != 1 {
            return Err(StoreError::Invariant(format!(
                "refresh of {} key {} touched {} rows",
                dimension.table, sk, n
            )));
        }
        Ok(())
    }

    fn load_mapping(
        &self,
        dimension: &DimensionSpec,
    ) -> Result<Vec<(NaturalKey, SurrogateKey)>, StoreError> {
        let names: Vec<&str> = dimension.natural_key.iter().map(|c| c.name).collect();
        let sql = format!(
            "SELECT {key}, {cols} FROM {table} ORDER BY {key};",
            key = dimension.key_column,
            cols = names.join(", "),
            table = dimension.table,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let sk = SurrogateKey(row.get(0)?);
            let mut parts = Vec::with_capacity(dimension.natural_key.len());
            for (idx, col) in dimension.natural_key.iter().enumerate() {
                let part = match col.kind {
                    ColumnKind::Int => row.get::<usize, Option<i64>>(idx + 1)?.map(KeyPart::Int),
                    ColumnKind::Text => row
                        .get::<usize, Option<String>>(idx + 1)?
                        .map(KeyPart::Text),
                };
                parts.push(part);
            }
            Ok((NaturalKey(parts), sk))
        })?;
        let entries = rows.collect::<Result<Vec<_>, duckdb::Error>>()?;
        debug!("read {} keys from {}", entries.len(), dimension.table);
        Ok(entries)
    }

    fn upsert_facts(&self, fact: &FactSpec, rows: &[ResolvedFact]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let keys = fact.key_columns();
        let mut columns = keys.clone();
        let mut placeholders: Vec<String> = vec!["?".to_string(); keys.len()];
        for m in &fact.measures {
            columns.push(m.column);
            placeholders.push(format!("CAST(? AS {})", m.sql_type));
        }
        let updates: Vec<String> = fact
            .measures
            .iter()
            .map(|m| format!("{c} = EXCLUDED.{c}", c = m.column))
            .collect();
        let sql = format!(
            r#"
INSERT INTO {table} ({columns})
VALUES ({placeholders})
ON CONFLICT ({keys}) DO UPDATE
SET {updates};
"#,
            table = fact.table,
            columns = columns.join(", "),
            placeholders = placeholders.join(", "),
            keys = keys.join(", "),
            updates = updates.join(", "),
        );

        self.in_transaction(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut n = 0;
            for row in rows {
                let mut values: Vec<Scalar> = row.keys.iter().map(|k| Scalar::Int(k.0)).collect();
                values.extend(row.measures.iter().map(|m| Scalar::from(*m)));
                n += stmt.execute(params_from_iter(values))?;
            }
            Ok(n)
        })
    }

    fn rebuild_aggregate(&self, aggregate: &AggregateSpec) -> Result<usize, StoreError> {
        let names: Vec<&str> = aggregate.columns.iter().map(|c| c.name).collect();
        let delete = format!("DELETE FROM {};", aggregate.table);
        let insert = format!(
            "INSERT INTO {} ({})\n{};",
            aggregate.table,
            names.join(", "),
            aggregate.select
        );
        self.in_transaction(|conn| {
            conn.execute(&delete, params![])?;
            Ok(conn.execute(&insert, params![])?)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::warehouse::energy::{create_schema, date_dimension, fuel_generation_fact};

    #[test]
    fn insert_and_lookup() -> Result<(), Box<dyn Error>> {
        let session = WarehouseSession::open_in_memory()?;
        create_schema(&session)?;
        let dim = date_dimension();
        let key = NaturalKey::year(2020);
        assert_eq!(session.lookup(&dim, &key)?, None);
        let sk = session.insert_returning_key(&dim, &key, &[])?;
        assert_eq!(session.lookup(&dim, &key)?, Some(sk));
        let sk2 = session.insert_returning_key(&dim, &NaturalKey::year(2021), &[])?;
        assert!(sk2 > sk);
        assert_eq!(
            session.load_mapping(&dim)?,
            vec![(key, sk), (NaturalKey::year(2021), sk2)]
        );
        Ok(())
    }

    #[test]
    fn failed_batch_rolls_back() -> Result<(), Box<dyn Error>> {
        let session = WarehouseSession::open_in_memory()?;
        create_schema(&session)?;
        let fact = fuel_generation_fact();
        let rows = vec![
            ResolvedFact {
                keys: vec![SurrogateKey(1), SurrogateKey(1), SurrogateKey(1)],
                measures: vec![Some(dec!(10))],
            },
            // too large for DECIMAL(18,3)
            ResolvedFact {
                keys: vec![SurrogateKey(2), SurrogateKey(1), SurrogateKey(1)],
                measures: vec![Some(Decimal::new(i64::MAX, 0))],
            },
        ];
        assert!(session.upsert_facts(&fact, &rows).is_err());
        let n: i64 = session
            .connection()
            .query_row("SELECT COUNT(*) FROM fuel_generation", [], |row| row.get(0))?;
        assert_eq!(n, 0);
        Ok(())
    }
}
