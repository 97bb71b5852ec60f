use thiserror::Error;

/// A backing store operation failed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("insert into {table} did not return a surrogate key")]
    NoKeyReturned { table: String },

    #[error("{0}")]
    Invariant(String),
}

/// Dimension lookup or insert failed.  Fatal to the run.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("failed to resolve {dimension} key {key}: {source}")]
    Store {
        dimension: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("natural key for {dimension} has no usable field")]
    EmptyKey { dimension: String },

    #[error("{dimension} expects {expected} key fields, got {actual}")]
    KeyShape {
        dimension: String,
        expected: usize,
        actual: usize,
    },
}

/// A fact batch could not be written.  Skipped rows are not errors.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no key mapping for dimension {dimension} (needed by {fact})")]
    MissingMapping { fact: String, dimension: String },

    #[error("fact row for {fact} has {actual} values, expected {expected}")]
    RowShape {
        fact: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to upsert into {fact}: {source}")]
    Store {
        fact: String,
        #[source]
        source: StoreError,
    },
}

/// Aggregate rebuild failed.  Base fact tables are left untouched.
#[derive(Error, Debug)]
#[error("failed to rebuild {table}: {source}")]
pub struct RebuildError {
    pub table: String,
    #[source]
    pub source: StoreError,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

/// Failures of the raw row suppliers.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bad {field} value {value:?}")]
    BadValue { field: &'static str, value: String },
}

/// Run-level error.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Rebuild(#[from] RebuildError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),
}
