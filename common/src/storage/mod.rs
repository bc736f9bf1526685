pub mod db;
pub mod statements;
pub mod store;
pub mod types;
