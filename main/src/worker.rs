use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use common::utils::config::get_config;
use ingestion_pipeline::{
    orchestrator::{DEVICE_ENV, WORKER_ID_ENV},
    WorkerConfig,
};
use review_loader::{
    args::WorkerArgs,
    runtime::{build_embedder, connect, init_tracing, load_reviews, ReviewLoad},
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let args = WorkerArgs::parse();
    let worker_id = std::env::var(WORKER_ID_ENV).unwrap_or_else(|_| "0".to_string());
    let device = std::env::var(DEVICE_ENV).ok().filter(|value| !value.is_empty());

    let config = get_config(args.config.as_deref()).context("loading configuration")?;
    let client = connect(&config).await?;
    let embedder = build_embedder(&config).await?;

    let report = load_reviews(
        client,
        embedder,
        ReviewLoad {
            reviews: &args.reviews,
            metadata: &args.metadata,
            skip_missing_metadata: args.skip_missing_metadata,
            worker: WorkerConfig::default()
                .with_batch_size(args.batch_size)
                .with_identity(worker_id.clone(), device),
        },
    )
    .await?;

    if report.all_batches_landed() {
        info!(%worker_id, rows = report.rows_written, "shard loaded");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            %worker_id,
            batches_failed = report.batches_failed,
            records_dropped = report.records_dropped,
            "shard loaded with failed batches"
        );
        Ok(ExitCode::FAILURE)
    }
}
