pub mod config;
pub mod error;
pub mod sources;
pub mod utils;
pub mod warehouse;
