pub mod coerce;
pub mod config;
pub mod embedding;
