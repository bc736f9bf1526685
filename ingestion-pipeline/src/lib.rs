#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod devices;
pub mod embedder;
pub mod filter;
pub mod metadata;
pub mod orchestrator;
pub mod reader;
pub mod splitter;
pub mod upsert;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use embedder::{FixedDimEmbedder, TextEmbedder};
pub use filter::ParentFilter;
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunSummary, WorkerOutcome};
pub use upsert::UpsertEngine;
pub use worker::{ShardReport, ShardWorker, WorkerConfig};
