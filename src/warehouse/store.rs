use rust_decimal::Decimal;

use crate::error::StoreError;

use super::keys::{NaturalKey, Scalar, SurrogateKey};
use super::schema::{AggregateSpec, DimensionSpec, FactSpec};

/// A fact row whose dimension references have all been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFact {
    pub keys: Vec<SurrogateKey>,
    pub measures: Vec<Option<Decimal>>,
}

/// Primitives the reconciler, the loader and the aggregate rebuild need from
/// a backing store.  Keys passed in are already normalized.
pub trait Warehouse {
    /// Point lookup honoring the dimension's match rule.  When several rows
    /// match, the lowest surrogate key wins.
    fn lookup(
        &self,
        dimension: &DimensionSpec,
        key: &NaturalKey,
    ) -> Result<Option<SurrogateKey>, StoreError>;

    /// Insert a new dimension row and return its generated key.
    fn insert_returning_key(
        &self,
        dimension: &DimensionSpec,
        key: &NaturalKey,
        attributes: &[Scalar],
    ) -> Result<SurrogateKey, StoreError>;

    /// Overwrite the descriptive attributes of an existing row.
    fn refresh_attributes(
        &self,
        dimension: &DimensionSpec,
        sk: SurrogateKey,
        attributes: &[Scalar],
    ) -> Result<(), StoreError>;

    /// Every natural key currently in the dimension table, ordered by
    /// surrogate key.
    fn load_mapping(
        &self,
        dimension: &DimensionSpec,
    ) -> Result<Vec<(NaturalKey, SurrogateKey)>, StoreError>;

    /// Insert-or-update each row keyed by the full dimension key tuple,
    /// atomically for the whole batch.  Only measures change on conflict.
    fn upsert_facts(&self, fact: &FactSpec, rows: &[ResolvedFact]) -> Result<usize, StoreError>;

    /// Delete all rows of the aggregate table and repopulate it from its
    /// query, atomically.  Returns the number of rows written.
    fn rebuild_aggregate(&self, aggregate: &AggregateSpec) -> Result<usize, StoreError>;
}
