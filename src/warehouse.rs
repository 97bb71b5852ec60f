//! Star schema warehouse: dimensions keyed by surrogate keys, facts keyed by
//! dimension keys, aggregates recomputed from facts.

pub mod aggregates;
pub mod duckdb_store;
pub mod energy;
pub mod fuel;
pub mod keys;
pub mod loader;
pub mod mapping;
pub mod reconciler;
pub mod schema;
pub mod store;
