use std::collections::HashMap;
use std::fmt::{self, Display};

use log::{debug, info};
use rust_decimal::Decimal;

use crate::error::LoadError;

use super::keys::{NaturalKey, SurrogateKey};
use super::mapping::{DimensionMappings, KeyMapping};
use super::schema::FactSpec;
use super::store::{ResolvedFact, Warehouse};

/// A measure row as handed over by a source, referencing dimensions by
/// natural key.  `keys` and `measures` follow the order of the fact's
/// dimensions and measures.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub keys: Vec<NaturalKey>,
    pub measures: Vec<Option<Decimal>>,
}

/// Why a fact row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    UnresolvedDimension(&'static str),
    MissingMeasure(&'static str),
    NoMeasures,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnresolvedDimension(d) => write!(f, "unresolved {} key", d),
            SkipReason::MissingMeasure(m) => write!(f, "missing {}", m),
            SkipReason::NoMeasures => write!(f, "no measures"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
    pub skip_reasons: HashMap<SkipReason, usize>,
}

impl LoadReport {
    fn skip(&mut self, reason: SkipReason) {
        self.skipped += 1;
        *self.skip_reasons.entry(reason).or_insert(0) += 1;
    }
}

/// Resolves fact rows against the run's key mappings and upserts them.
pub struct FactLoader<'a, W: Warehouse + ?Sized> {
    store: &'a W,
    fact: &'a FactSpec,
    mappings: Vec<&'a KeyMapping>,
    batch_size: usize,
}

impl<'a, W: Warehouse + ?Sized> FactLoader<'a, W> {
    /// Every dimension the fact references must have been reconciled (or
    /// reloaded) already.
    pub fn new(
        store: &'a W,
        fact: &'a FactSpec,
        mappings: &'a DimensionMappings,
        batch_size: usize,
    ) -> Result<Self, LoadError> {
        let mappings = fact
            .dimensions
            .iter()
            .map(|d| {
                mappings
                    .get(d.dimension)
                    .ok_or_else(|| LoadError::MissingMapping {
                        fact: fact.table.to_string(),
                        dimension: d.dimension.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FactLoader {
            store,
            fact,
            mappings,
            batch_size: batch_size.max(1),
        })
    }

    /// Resolve every dimension reference of a row.  The outer error is for
    /// malformed rows, the inner one for rows that are to be skipped.
    pub fn resolve(&self, row: &FactRow) -> Result<Result<ResolvedFact, SkipReason>, LoadError> {
        if row.keys.len() != self.fact.dimensions.len()
            || row.measures.len() != self.fact.measures.len()
        {
            return Err(LoadError::RowShape {
                fact: self.fact.table.to_string(),
                expected: self.fact.dimensions.len() + self.fact.measures.len(),
                actual: row.keys.len() + row.measures.len(),
            });
        }
        if let Some((m, _)) = self
            .fact
            .measures
            .iter()
            .zip(&row.measures)
            .find(|(m, v)| m.required && v.is_none())
        {
            return Ok(Err(SkipReason::MissingMeasure(m.column)));
        }
        if row.measures.iter().all(|v| v.is_none()) {
            return Ok(Err(SkipReason::NoMeasures));
        }

        let mut keys: Vec<SurrogateKey> = Vec::with_capacity(row.keys.len());
        for (key, mapping) in row.keys.iter().zip(&self.mappings) {
            match mapping.resolve(key) {
                Some(sk) => keys.push(sk),
                None => {
                    return Ok(Err(SkipReason::UnresolvedDimension(
                        mapping.dimension().name,
                    )))
                }
            }
        }
        Ok(Ok(ResolvedFact {
            keys,
            measures: row.measures.clone(),
        }))
    }

    pub fn load(&self, rows: &[FactRow]) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::default();
        for chunk in rows.chunks(self.batch_size) {
            let mut batch: Vec<ResolvedFact> = Vec::with_capacity(chunk.len());
            let mut position: HashMap<Vec<SurrogateKey>, usize> = HashMap::new();
            for row in chunk {
                match self.resolve(row)? {
                    Ok(fact) => {
                        report.loaded += 1;
                        // later rows win, same as upserting them one by one
                        match position.get(&fact.keys) {
                            Some(&idx) => batch[idx] = fact,
                            None => {
                                position.insert(fact.keys.clone(), batch.len());
                                batch.push(fact);
                            }
                        }
                    }
                    Err(reason) => {
                        debug!("{}: skipping row {:?}: {}", self.fact.table, row.keys, reason);
                        report.skip(reason);
                    }
                }
            }
            self.store
                .upsert_facts(self.fact, &batch)
                .map_err(|source| LoadError::Store {
                    fact: self.fact.table.to_string(),
                    source,
                })?;
        }
        info!(
            "{}: {} rows loaded, {} skipped",
            self.fact.table, report.loaded, report.skipped
        );
        Ok(report)
    }
}

/// Resolve and upsert `rows` into `fact`, `batch_size` rows per transaction.
pub fn load_facts<W: Warehouse + ?Sized>(
    store: &W,
    fact: &FactSpec,
    mappings: &DimensionMappings,
    rows: &[FactRow],
    batch_size: usize,
) -> Result<LoadReport, LoadError> {
    FactLoader::new(store, fact, mappings, batch_size)?.load(rows)
}
