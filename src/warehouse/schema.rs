//! Declarative description of dimensions, facts and aggregates.  One generic
//! reconciler/loader pair works off these instead of per-table code.

use crate::error::ResolutionError;

use super::keys::{KeyPart, NaturalKey, Normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Text,
}

/// A natural key column of a dimension table.
#[derive(Debug, Clone)]
pub struct KeyColumn {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub kind: ColumnKind,
    pub normalize: Normalize,
}

impl KeyColumn {
    pub fn int(name: &'static str) -> KeyColumn {
        KeyColumn {
            name,
            sql_type: "INTEGER",
            kind: ColumnKind::Int,
            normalize: Normalize::Trim,
        }
    }

    pub fn text(name: &'static str, sql_type: &'static str, normalize: Normalize) -> KeyColumn {
        KeyColumn {
            name,
            sql_type,
            kind: ColumnKind::Text,
            normalize,
        }
    }

    /// Compared ignoring case, in memory and in SQL.
    pub fn caseless(&self) -> bool {
        self.normalize == Normalize::TrimFold
    }
}

/// A plain (non key) column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
}

impl Column {
    pub fn new(name: &'static str, sql_type: &'static str) -> Column {
        Column { name, sql_type }
    }
}

/// How an incoming natural key is matched against known entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Every key field must be equal.
    AllFields,
    /// Any one supplied key field being equal to the same field of a stored
    /// row is a match.  Among several matching rows the lowest surrogate key
    /// wins.  Two distinct entities that share a code or a name collapse into
    /// one key.
    AnyField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Existing entries are never touched.
    InsertOnly,
    /// Existing entries get their descriptive attributes overwritten
    /// (last seen wins).  The surrogate key is kept.
    RefreshAttributes,
}

/// Where the descriptive attributes of a new entry come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Taken from the source row; missing trailing attributes are NULL.
    Supplied,
    /// Derived from the fuel name, see [`super::fuel::classify_fuel`].
    FuelClassification,
}

#[derive(Debug, Clone)]
pub struct DimensionSpec {
    pub name: &'static str,
    pub table: &'static str,
    pub key_column: &'static str,
    pub sequence: &'static str,
    pub natural_key: Vec<KeyColumn>,
    pub attributes: Vec<Column>,
    pub match_rule: MatchRule,
    pub policy: RefreshPolicy,
    pub derivation: Derivation,
}

impl DimensionSpec {
    /// Clean every field of the key according to its column.  Fails if the key
    /// has the wrong number of fields or if nothing usable is left.
    pub fn normalize(&self, key: &NaturalKey) -> Result<NaturalKey, ResolutionError> {
        if key.parts().len() != self.natural_key.len() {
            return Err(ResolutionError::KeyShape {
                dimension: self.name.to_string(),
                expected: self.natural_key.len(),
                actual: key.parts().len(),
            });
        }
        let parts: Vec<Option<KeyPart>> = self
            .natural_key
            .iter()
            .zip(key.parts())
            .map(|(col, part)| col.normalize.apply(part.as_ref()))
            .collect();
        let key = NaturalKey(parts);
        if key.is_empty() {
            return Err(ResolutionError::EmptyKey {
                dimension: self.name.to_string(),
            });
        }
        Ok(key)
    }

    /// The key as compared against other keys, see [`Normalize::match_form`].
    /// Expects a normalized key.
    pub fn match_key(&self, key: &NaturalKey) -> NaturalKey {
        NaturalKey(
            self.natural_key
                .iter()
                .zip(key.parts())
                .map(|(col, part)| part.as_ref().map(|p| col.normalize.match_form(p)))
                .collect(),
        )
    }

    pub fn ddl(&self) -> String {
        let mut columns = vec![format!(
            "    {} BIGINT PRIMARY KEY DEFAULT nextval('{}')",
            self.key_column, self.sequence
        )];
        columns.extend(
            self.natural_key
                .iter()
                .map(|c| format!("    {} {}", c.name, c.sql_type)),
        );
        columns.extend(
            self.attributes
                .iter()
                .map(|c| format!("    {} {}", c.name, c.sql_type)),
        );
        if self.match_rule == MatchRule::AllFields {
            let names: Vec<&str> = self.natural_key.iter().map(|c| c.name).collect();
            columns.push(format!("    UNIQUE ({})", names.join(", ")));
        }
        format!(
            "CREATE SEQUENCE IF NOT EXISTS {} START 1;\nCREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
            self.sequence,
            self.table,
            columns.join(",\n")
        )
    }
}

/// A foreign key of a fact table, pointing at a dimension by name.
#[derive(Debug, Clone)]
pub struct FactDimension {
    pub dimension: &'static str,
    pub column: &'static str,
}

#[derive(Debug, Clone)]
pub struct Measure {
    pub column: &'static str,
    pub sql_type: &'static str,
    /// A row with a null required measure is skipped.
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct FactSpec {
    pub table: &'static str,
    pub dimensions: Vec<FactDimension>,
    pub measures: Vec<Measure>,
}

impl FactSpec {
    pub fn key_columns(&self) -> Vec<&'static str> {
        self.dimensions.iter().map(|d| d.column).collect()
    }

    pub fn ddl(&self) -> String {
        let mut columns: Vec<String> = self
            .dimensions
            .iter()
            .map(|d| format!("    {} BIGINT NOT NULL", d.column))
            .collect();
        columns.extend(
            self.measures
                .iter()
                .map(|m| format!("    {} {}", m.column, m.sql_type)),
        );
        columns.push(format!("    PRIMARY KEY ({})", self.key_columns().join(", ")));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
            self.table,
            columns.join(",\n")
        )
    }
}

/// A derived table that is recomputed wholesale from base facts.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub table: &'static str,
    /// Base fact table the aggregate is derived from.
    pub source: &'static str,
    pub columns: Vec<Column>,
    pub key_columns: Vec<&'static str>,
    /// Query producing rows in the order of `columns`.
    pub select: String,
}

impl AggregateSpec {
    pub fn ddl(&self) -> String {
        let mut columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.sql_type))
            .collect();
        columns.push(format!("    PRIMARY KEY ({})", self.key_columns.join(", ")));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
            self.table,
            columns.join(",\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> DimensionSpec {
        DimensionSpec {
            name: "geo",
            table: "dim_geo",
            key_column: "geo_key",
            sequence: "seq_dim_geo",
            natural_key: vec![
                KeyColumn::text("country_code", "VARCHAR", Normalize::TrimUpper),
                KeyColumn::text("country_name", "VARCHAR", Normalize::TrimFold),
            ],
            attributes: vec![Column::new("region_grp", "VARCHAR")],
            match_rule: MatchRule::AnyField,
            policy: RefreshPolicy::InsertOnly,
            derivation: Derivation::Supplied,
        }
    }

    #[test]
    fn normalize_key() {
        let dim = geo();
        let key = NaturalKey(vec![Some(" ph".into()), Some(" Philippines ".into())]);
        assert_eq!(
            dim.normalize(&key).unwrap(),
            NaturalKey(vec![Some("PH".into()), Some("Philippines".into())])
        );
    }

    #[test]
    fn match_key_folds_names_only() {
        let dim = geo();
        let key = dim
            .normalize(&NaturalKey(vec![Some("ph".into()), Some("PHILIPPINES".into())]))
            .unwrap();
        assert_eq!(
            dim.match_key(&key),
            NaturalKey(vec![Some("PH".into()), Some("philippines".into())])
        );
        assert!(dim.natural_key[1].caseless());
        assert!(!dim.natural_key[0].caseless());
    }

    #[test]
    fn reject_bad_keys() {
        let dim = geo();
        let empty = NaturalKey(vec![Some(" ".into()), None]);
        assert!(matches!(
            dim.normalize(&empty),
            Err(ResolutionError::EmptyKey { .. })
        ));
        let short = NaturalKey::single("PH");
        assert!(matches!(
            dim.normalize(&short),
            Err(ResolutionError::KeyShape { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn ddl_has_no_unique_for_any_field_match() {
        let sql = geo().ddl();
        assert!(sql.contains("geo_key BIGINT PRIMARY KEY DEFAULT nextval('seq_dim_geo')"));
        assert!(!sql.contains("UNIQUE"));
    }
}
