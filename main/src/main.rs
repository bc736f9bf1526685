use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use common::utils::config::{get_config, AppConfig};
use ingestion_pipeline::{
    devices::{DeviceProbe, FixedProbe, NvidiaSmiProbe},
    orchestrator::sibling_binary,
    Orchestrator, OrchestratorConfig, WorkerConfig,
};
use review_loader::{
    args::LoaderArgs,
    runtime::{build_embedder, connect, init_tracing, load_metadata_file, load_reviews, ReviewLoad},
};
use tracing::{error, info, warn};

const SAMPLE_RECORDS: usize = 3;
const SAMPLE_BATCH_SIZE: usize = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let args = LoaderArgs::parse();
    let config = get_config(args.config.as_deref()).context("loading configuration")?;
    info!(?config, "configuration loaded");

    for input in [&args.metadata, &args.reviews] {
        std::fs::File::open(input)
            .with_context(|| format!("opening input file {}", input.display()))?;
    }

    // Multi-device runs check for accelerators before any data is written.
    let multi_device = if args.multi_device && !args.test {
        let orchestrator = orchestrator(&args, &config);
        let devices = orchestrator.devices().await.context("detecting accelerators")?;
        Some((orchestrator, devices))
    } else {
        None
    };

    let client = connect(&config).await?;
    if let Some(schema) = &args.schema {
        client
            .apply_schema(schema)
            .await
            .with_context(|| format!("applying schema {}", schema.display()))?;
    }

    if args.test {
        return run_sample(&args, &config, client).await;
    }

    let (client, metadata) =
        load_metadata_file(client, &args.metadata, config.metadata_batch_size, None).await?;
    let mut clean = metadata.batches_failed == 0;

    if let Some((orchestrator, devices)) = multi_device {
        drop(client);
        let summary = orchestrator
            .run_on(devices)
            .await
            .context("multi-device review load")?;
        clean &= summary.all_succeeded();
    } else {
        let embedder = build_embedder(&config).await?;
        let report = load_reviews(
            client,
            embedder,
            ReviewLoad {
                reviews: &args.reviews,
                metadata: &args.metadata,
                skip_missing_metadata: args.skip_missing_metadata,
                worker: WorkerConfig::default().with_batch_size(args.batch_size),
            },
        )
        .await?;
        clean &= report.all_batches_landed();
    }

    if clean {
        info!("all data loaded");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("load finished with failed batches or shards; see log for details");
        Ok(ExitCode::FAILURE)
    }
}

async fn run_sample(
    args: &LoaderArgs,
    config: &AppConfig,
    client: common::storage::db::PgClient,
) -> Result<ExitCode> {
    if args.multi_device {
        warn!("--multi-device ignored in test mode; loading a small sample in one process");
    }

    let (client, metadata) =
        load_metadata_file(client, &args.metadata, SAMPLE_BATCH_SIZE, Some(SAMPLE_RECORDS)).await?;
    let embedder = build_embedder(config).await?;
    let report = load_reviews(
        client,
        embedder,
        ReviewLoad {
            reviews: &args.reviews,
            metadata: &args.metadata,
            skip_missing_metadata: args.skip_missing_metadata,
            worker: WorkerConfig::default()
                .with_batch_size(SAMPLE_BATCH_SIZE)
                .with_max_records(Some(SAMPLE_RECORDS)),
        },
    )
    .await?;

    info!(
        metadata_rows = metadata.rows_written,
        review_rows = report.rows_written,
        "sample run completed"
    );
    if metadata.batches_failed == 0 && report.all_batches_landed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn orchestrator(args: &LoaderArgs, config: &AppConfig) -> Orchestrator {
    let probe: Arc<dyn DeviceProbe> = match args.devices {
        Some(count) => Arc::new(FixedProbe(count)),
        None => Arc::new(NvidiaSmiProbe::default()),
    };

    Orchestrator::new(
        probe,
        config.clone(),
        OrchestratorConfig {
            reviews: args.reviews.clone(),
            metadata: args.metadata.clone(),
            batch_size: args.batch_size,
            skip_missing_metadata: args.skip_missing_metadata,
            max_devices: args.max_devices,
            worker_timeout: args.worker_timeout_secs.map(Duration::from_secs),
            worker_program: args
                .worker_bin
                .clone()
                .unwrap_or_else(|| sibling_binary("review-worker")),
            config_file: args.config.clone(),
        },
    )
}
