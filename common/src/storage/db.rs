use std::{ops::Deref, path::Path};

use async_trait::async_trait;
use pgvector::Vector;
use tokio_postgres::{types::ToSql, Client, NoTls, Transaction};
use tracing::{debug, error, info, warn};

use crate::{error::AppError, utils::config::AppConfig};

use super::{
    statements::{
        metadata_upsert_sql, review_insert_sql, rows_per_statement, METADATA_COLUMNS,
        REVIEW_COLUMNS,
    },
    store::{ensure_aligned, ReviewStore},
    types::{metadata::collapse_duplicate_keys, MetadataRow, ReviewRow},
};

type Param<'a> = &'a (dyn ToSql + Sync);

pub struct PgClient {
    client: Client,
}

impl PgClient {
    /// Connects with the settings in `config`.
    pub async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let client = Self::connect_with(&config.pg_config()).await?;
        debug!(
            host = %config.pghost,
            port = config.pgport,
            database = %config.pgdatabase,
            "connected to postgres"
        );
        Ok(client)
    }

    pub async fn connect_with(pg: &tokio_postgres::Config) -> Result<Self, AppError> {
        let (client, connection) = pg.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection error");
            }
        });
        Ok(Self { client })
    }

    /// Runs every `;`-separated statement of a DDL file. Statements that fail
    /// (typically because the object already exists) are logged and skipped;
    /// an unreadable file is an error.
    pub async fn apply_schema(&self, path: &Path) -> Result<usize, AppError> {
        let ddl = tokio::fs::read_to_string(path).await?;
        let mut applied = 0usize;
        for statement in ddl.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            match self.client.batch_execute(statement).await {
                Ok(()) => applied += 1,
                Err(err) => warn!(error = %err, statement, "skipping schema statement"),
            }
        }
        info!(path = %path.display(), applied, "schema file applied");
        Ok(applied)
    }
}

impl Deref for PgClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

fn metadata_params<'a>(row: &'a MetadataRow, out: &mut Vec<Param<'a>>) {
    out.push(&row.parent_asin);
    out.push(&row.main_category);
    out.push(&row.title);
    out.push(&row.average_rating);
    out.push(&row.rating_number);
    out.push(&row.features);
    out.push(&row.description);
    out.push(&row.price);
    out.push(&row.images);
    out.push(&row.videos);
    out.push(&row.store);
    out.push(&row.categories);
    out.push(&row.details);
    out.push(&row.bought_together);
}

fn review_params<'a>(row: &'a ReviewRow, embedding: &'a Vector, out: &mut Vec<Param<'a>>) {
    out.push(&row.asin);
    out.push(&row.user_id);
    out.push(&row.rating);
    out.push(&row.title);
    out.push(&row.review_text);
    out.push(&row.images);
    out.push(&row.parent_asin);
    out.push(&row.ts);
    out.push(&row.helpful_vote);
    out.push(&row.verified_purchase);
    out.push(embedding);
}

async fn write_metadata(tx: &Transaction<'_>, rows: &[&MetadataRow]) -> Result<u64, AppError> {
    let mut written = 0u64;
    for page in rows.chunks(rows_per_statement(METADATA_COLUMNS)) {
        let sql = metadata_upsert_sql(page.len());
        let mut params: Vec<Param<'_>> = Vec::with_capacity(page.len() * METADATA_COLUMNS.len());
        for row in page {
            metadata_params(row, &mut params);
        }
        written += tx.execute(sql.as_str(), &params).await?;
    }
    Ok(written)
}

async fn write_reviews(
    tx: &Transaction<'_>,
    rows: &[ReviewRow],
    vectors: &[Vector],
) -> Result<u64, AppError> {
    let per_page = rows_per_statement(REVIEW_COLUMNS);
    let mut written = 0u64;
    for (rows_page, vectors_page) in rows.chunks(per_page).zip(vectors.chunks(per_page)) {
        let sql = review_insert_sql(rows_page.len());
        let mut params: Vec<Param<'_>> =
            Vec::with_capacity(rows_page.len() * REVIEW_COLUMNS.len());
        for (row, vector) in rows_page.iter().zip(vectors_page) {
            review_params(row, vector, &mut params);
        }
        written += tx.execute(sql.as_str(), &params).await?;
    }
    Ok(written)
}

async fn finish(tx: Transaction<'_>, result: Result<u64, AppError>) -> Result<u64, AppError> {
    match result {
        Ok(written) => {
            tx.commit().await?;
            Ok(written)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

#[async_trait]
impl ReviewStore for PgClient {
    async fn upsert_metadata(&mut self, rows: &[MetadataRow]) -> Result<u64, AppError> {
        let rows = collapse_duplicate_keys(rows);
        if rows.is_empty() {
            return Ok(0);
        }
        let tx = self.client.transaction().await?;
        let result = write_metadata(&tx, &rows).await;
        finish(tx, result).await
    }

    async fn insert_reviews(
        &mut self,
        rows: &[ReviewRow],
        embeddings: &[Vec<f32>],
    ) -> Result<u64, AppError> {
        ensure_aligned(rows.len(), embeddings.len())?;
        if rows.is_empty() {
            return Ok(0);
        }
        let vectors: Vec<Vector> = embeddings
            .iter()
            .map(|embedding| Vector::from(embedding.clone()))
            .collect();
        let tx = self.client.transaction().await?;
        let result = write_reviews(&tx, rows, &vectors).await;
        finish(tx, result).await
    }
}
