use log::{debug, info};

use crate::error::{ResolutionError, StoreError};

use super::fuel::classify_fuel;
use super::keys::{KeyPart, NaturalKey, Scalar, SurrogateKey};
use super::mapping::KeyMapping;
use super::schema::{Derivation, DimensionSpec, RefreshPolicy};
use super::store::Warehouse;

/// One raw sighting of a dimension value.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionEntry {
    pub key: NaturalKey,
    pub attributes: Vec<Scalar>,
}

impl DimensionEntry {
    pub fn new(key: NaturalKey) -> DimensionEntry {
        DimensionEntry {
            key,
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes(key: NaturalKey, attributes: Vec<Scalar>) -> DimensionEntry {
        DimensionEntry { key, attributes }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub inserted: usize,
    pub matched: usize,
    pub refreshed: usize,
}

/// Assigns stable surrogate keys to the natural keys of one dimension.
///
/// Not safe to share between threads working on the same dimension: two
/// writers seeing the same unseen key would both insert it.
pub struct DimensionReconciler<'a, W: Warehouse + ?Sized> {
    store: &'a W,
    dimension: &'a DimensionSpec,
    mapping: KeyMapping,
    stats: ReconcileStats,
}

impl<'a, W: Warehouse + ?Sized> DimensionReconciler<'a, W> {
    pub fn new(store: &'a W, dimension: &'a DimensionSpec) -> Self {
        Self::with_mapping(store, dimension, KeyMapping::new(dimension))
    }

    /// Start from a mapping already loaded from the store, see
    /// [`reload_mapping`].
    pub fn with_mapping(store: &'a W, dimension: &'a DimensionSpec, mapping: KeyMapping) -> Self {
        DimensionReconciler {
            store,
            dimension,
            mapping,
            stats: ReconcileStats::default(),
        }
    }

    /// Return the surrogate key for `key`, inserting a new dimension row if
    /// the key has never been seen.  Value-refresh dimensions get their
    /// attributes overwritten when the key is already known.
    ///
    /// Only keys seen before in the same form are answered from memory.
    /// Anything else asks the store, which has every row to pick the lowest
    /// matching key from.
    pub fn reconcile(
        &mut self,
        key: &NaturalKey,
        attributes: &[Scalar],
    ) -> Result<SurrogateKey, ResolutionError> {
        let key = self.dimension.normalize(key)?;
        let known = match self.mapping.resolve_exact(&key) {
            Some(sk) => Some(sk),
            None => self
                .store
                .lookup(self.dimension, &key)
                .map_err(|e| self.store_error(&key, e))?,
        };

        let sk = match known {
            Some(sk) => {
                self.stats.matched += 1;
                if self.dimension.policy == RefreshPolicy::RefreshAttributes
                    && !attributes.is_empty()
                {
                    self.store
                        .refresh_attributes(self.dimension, sk, attributes)
                        .map_err(|e| self.store_error(&key, e))?;
                    self.stats.refreshed += 1;
                }
                self.mapping.insert_resolved(key, sk);
                sk
            }
            None => {
                let attributes = match self.dimension.derivation {
                    Derivation::Supplied => attributes.to_vec(),
                    Derivation::FuelClassification => {
                        classify_fuel(first_text(&key)).attributes()
                    }
                };
                let sk = self
                    .store
                    .insert_returning_key(self.dimension, &key, &attributes)
                    .map_err(|e| self.store_error(&key, e))?;
                debug!("{}: new key {} for {}", self.dimension.name, sk, key);
                self.stats.inserted += 1;
                self.mapping.insert_row(key, sk);
                sk
            }
        };
        Ok(sk)
    }

    pub fn mapping(&self) -> &KeyMapping {
        &self.mapping
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    pub fn finish(self) -> (KeyMapping, ReconcileStats) {
        (self.mapping, self.stats)
    }

    fn store_error(&self, key: &NaturalKey, source: StoreError) -> ResolutionError {
        ResolutionError::Store {
            dimension: self.dimension.name.to_string(),
            key: key.to_string(),
            source,
        }
    }
}

fn first_text(key: &NaturalKey) -> &str {
    key.parts()
        .iter()
        .find_map(|p| match p {
            Some(KeyPart::Text(s)) => Some(s.as_str()),
            _ => None,
        })
        .unwrap_or("")
}

/// Reconcile every entry of a dimension, in order.  Stops at the first store
/// failure.  The returned mapping also covers the rows stored by earlier runs.
pub fn reconcile_dimension<W: Warehouse + ?Sized>(
    store: &W,
    dimension: &DimensionSpec,
    entries: &[DimensionEntry],
) -> Result<(KeyMapping, ReconcileStats), ResolutionError> {
    let mapping = reload_mapping(store, dimension)?;
    let mut reconciler = DimensionReconciler::with_mapping(store, dimension, mapping);
    for entry in entries {
        reconciler.reconcile(&entry.key, &entry.attributes)?;
    }
    let (mapping, stats) = reconciler.finish();
    info!(
        "{}: {} keys, {} inserted, {} matched, {} refreshed",
        dimension.name,
        mapping.len(),
        stats.inserted,
        stats.matched,
        stats.refreshed
    );
    Ok((mapping, stats))
}

/// Rebuild a dimension's mapping from the rows already in the store, without
/// reconciling anything.
pub fn reload_mapping<W: Warehouse + ?Sized>(
    store: &W,
    dimension: &DimensionSpec,
) -> Result<KeyMapping, ResolutionError> {
    let entries = store
        .load_mapping(dimension)
        .map_err(|source| ResolutionError::Store {
            dimension: dimension.name.to_string(),
            key: "*".to_string(),
            source,
        })?;
    let mut mapping = KeyMapping::new(dimension);
    for (key, sk) in entries {
        mapping.insert_row(key, sk);
    }
    Ok(mapping)
}
