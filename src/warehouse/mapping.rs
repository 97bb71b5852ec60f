use std::collections::HashMap;

use super::keys::{KeyPart, NaturalKey, SurrogateKey};
use super::schema::{DimensionSpec, MatchRule};

/// Natural key to surrogate key lookup for one dimension, held in memory for
/// the duration of a run.
///
/// `exact` remembers every key resolved so far.  `by_field` only knows the
/// field values of stored dimension rows, so any-field matches agree with
/// [`Warehouse::lookup`](super::store::Warehouse::lookup): the lowest key of
/// all rows sharing a field wins.  Both are keyed by match form.
#[derive(Debug, Clone)]
pub struct KeyMapping {
    dimension: DimensionSpec,
    exact: HashMap<NaturalKey, SurrogateKey>,
    by_field: Vec<HashMap<KeyPart, SurrogateKey>>,
}

impl KeyMapping {
    pub fn new(dimension: &DimensionSpec) -> KeyMapping {
        KeyMapping {
            dimension: dimension.clone(),
            exact: HashMap::new(),
            by_field: vec![HashMap::new(); dimension.natural_key.len()],
        }
    }

    pub fn dimension(&self) -> &DimensionSpec {
        &self.dimension
    }

    /// Record a stored dimension row.  Rows must come in increasing key
    /// order, so each field value keeps the lowest key.
    pub fn insert_row(&mut self, key: NaturalKey, sk: SurrogateKey) {
        let key = self.dimension.match_key(&key);
        for (idx, part) in key.parts().iter().enumerate() {
            if let (Some(part), Some(index)) = (part, self.by_field.get_mut(idx)) {
                index.entry(part.clone()).or_insert(sk);
            }
        }
        self.exact.entry(key).or_insert(sk);
    }

    /// Record a key that resolved to an existing row.
    pub fn insert_resolved(&mut self, key: NaturalKey, sk: SurrogateKey) {
        let key = self.dimension.match_key(&key);
        self.exact.entry(key).or_insert(sk);
    }

    /// Look up a raw (not yet normalized) key.  Returns `None` for keys that
    /// are malformed or have no usable field.
    pub fn resolve(&self, key: &NaturalKey) -> Option<SurrogateKey> {
        let key = self.dimension.normalize(key).ok()?;
        self.resolve_normalized(&key)
    }

    pub(crate) fn resolve_normalized(&self, key: &NaturalKey) -> Option<SurrogateKey> {
        let key = self.dimension.match_key(key);
        if let Some(sk) = self.exact.get(&key) {
            return Some(*sk);
        }
        match self.dimension.match_rule {
            MatchRule::AllFields => None,
            MatchRule::AnyField => key
                .parts()
                .iter()
                .zip(&self.by_field)
                .filter_map(|(part, index)| index.get(part.as_ref()?).copied())
                .min(),
        }
    }

    /// Keys seen before in exactly this form, ignoring field matches.
    pub(crate) fn resolve_exact(&self, key: &NaturalKey) -> Option<SurrogateKey> {
        self.exact.get(&self.dimension.match_key(key)).copied()
    }

    /// Number of distinct natural keys recorded.
    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    /// Distinct surrogate keys, sorted.
    pub fn surrogate_keys(&self) -> Vec<SurrogateKey> {
        let mut keys: Vec<SurrogateKey> = self.exact.values().copied().collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// All key mappings of a run, by dimension name.
#[derive(Debug, Clone, Default)]
pub struct DimensionMappings {
    mappings: HashMap<String, KeyMapping>,
}

impl DimensionMappings {
    pub fn new() -> DimensionMappings {
        DimensionMappings::default()
    }

    pub fn insert(&mut self, mapping: KeyMapping) {
        self.mappings
            .insert(mapping.dimension().name.to_string(), mapping);
    }

    pub fn get(&self, dimension: &str) -> Option<&KeyMapping> {
        self.mappings.get(dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::energy::{date_dimension, fuel_dimension, geo_dimension};

    fn geo(code: Option<&str>, name: Option<&str>) -> NaturalKey {
        NaturalKey(vec![code.map(KeyPart::from), name.map(KeyPart::from)])
    }

    #[test]
    fn exact_match() {
        let mut mapping = KeyMapping::new(&date_dimension());
        mapping.insert_row(NaturalKey::year(2020), SurrogateKey(1));
        assert_eq!(mapping.resolve(&NaturalKey::year(2020)), Some(SurrogateKey(1)));
        assert_eq!(mapping.resolve(&NaturalKey::year(2021)), None);
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn any_field_match() {
        let mut mapping = KeyMapping::new(&geo_dimension());
        mapping.insert_row(geo(None, Some("Philippines")), SurrogateKey(7));
        mapping.insert_row(geo(Some("US"), Some("United States")), SurrogateKey(8));
        // code only, raw input gets normalized
        assert_eq!(mapping.resolve(&geo(Some("us "), None)), Some(SurrogateKey(8)));
        // name only, any case
        assert_eq!(
            mapping.resolve(&geo(Some("PH"), Some("PHILIPPINES"))),
            Some(SurrogateKey(7))
        );
        // no stored row carries the code PH
        assert_eq!(mapping.resolve(&geo(Some("PH"), None)), None);
        assert_eq!(mapping.resolve(&geo(None, None)), None);
        assert_eq!(mapping.surrogate_keys(), vec![SurrogateKey(7), SurrogateKey(8)]);
    }

    #[test]
    fn lowest_key_wins_across_fields() {
        let mut mapping = KeyMapping::new(&geo_dimension());
        mapping.insert_row(geo(Some("X"), Some("Alpha")), SurrogateKey(1));
        mapping.insert_row(geo(Some("Y"), Some("Beta")), SurrogateKey(2));
        assert_eq!(mapping.resolve(&geo(Some("Y"), Some("Alpha"))), Some(SurrogateKey(1)));
        assert_eq!(mapping.resolve(&geo(Some("Y"), None)), Some(SurrogateKey(2)));

        // a resolved key does not teach the field index anything
        mapping.insert_resolved(geo(Some("Y"), Some("Alpha")), SurrogateKey(1));
        assert_eq!(mapping.resolve(&geo(Some("Y"), None)), Some(SurrogateKey(2)));
        assert_eq!(mapping.resolve(&geo(Some("y"), Some("alpha"))), Some(SurrogateKey(1)));
    }

    #[test]
    fn fuel_names_ignore_case() {
        let mut mapping = KeyMapping::new(&fuel_dimension());
        mapping.insert_row(NaturalKey::single("Hydro"), SurrogateKey(3));
        assert_eq!(mapping.resolve(&NaturalKey::single(" HYDRO ")), Some(SurrogateKey(3)));
        assert_eq!(mapping.resolve_exact(&NaturalKey::single("hydro")), Some(SurrogateKey(3)));
        assert_eq!(mapping.resolve(&NaturalKey::single("Hydrogen")), None);
    }
}
