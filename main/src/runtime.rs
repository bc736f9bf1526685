use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use common::{
    storage::db::PgClient,
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use ingestion_pipeline::{
    metadata::{load_metadata, MetadataReport},
    FixedDimEmbedder, ParentFilter, ShardReport, ShardWorker, UpsertEngine, WorkerConfig,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sets up stderr logging; `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

pub async fn connect(config: &AppConfig) -> Result<PgClient> {
    PgClient::connect(config).await.with_context(|| {
        format!(
            "connecting to postgres at {}:{}/{}",
            config.pghost, config.pgport, config.pgdatabase
        )
    })
}

pub async fn build_embedder(config: &AppConfig) -> Result<FixedDimEmbedder> {
    let provider = EmbeddingProvider::from_config(config)
        .await
        .context("initialising embedding backend")?;
    info!(
        backend = provider.backend_label(),
        model = provider.model_code().as_deref().unwrap_or("-"),
        native_dimension = provider.dimension(),
        stored_dimension = config.embedding_dimension,
        "embedding backend ready"
    );
    Ok(FixedDimEmbedder::new(
        Arc::new(provider),
        config.embedding_dimension,
    )?)
}

/// Loads the metadata file and returns the report with the client.
pub async fn load_metadata_file(
    client: PgClient,
    path: &Path,
    batch_size: usize,
    max_records: Option<usize>,
) -> Result<(PgClient, MetadataReport)> {
    let mut engine = UpsertEngine::new(client);
    let report = load_metadata(&mut engine, path, batch_size, max_records)
        .await
        .with_context(|| format!("loading metadata from {}", path.display()))?;
    Ok((engine.into_store(), report))
}

/// Everything one in-process review load needs besides the store.
pub struct ReviewLoad<'a> {
    pub reviews: &'a Path,
    pub metadata: &'a Path,
    pub skip_missing_metadata: bool,
    pub worker: WorkerConfig,
}

pub async fn load_reviews(
    client: PgClient,
    embedder: FixedDimEmbedder,
    load: ReviewLoad<'_>,
) -> Result<ShardReport> {
    let filter = if load.skip_missing_metadata {
        ParentFilter::load_from_metadata(load.metadata)
            .with_context(|| format!("reading parent keys from {}", load.metadata.display()))?
    } else {
        ParentFilter::disabled()
    };

    let mut worker = ShardWorker::new(client, embedder, filter, load.worker);
    let report = worker
        .run_file(load.reviews)
        .await
        .with_context(|| format!("loading reviews from {}", load.reviews.display()))?;
    Ok(report)
}
