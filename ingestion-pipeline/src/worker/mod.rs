mod config;
mod state;

pub use config::WorkerConfig;
pub use state::{accumulating, BatchMachine};

use std::{io::BufRead, path::Path};

use common::{
    error::AppError,
    storage::{
        store::ReviewStore,
        types::{RawReview, ReviewRow},
    },
};
use tracing::{debug, info, instrument};

use crate::{
    embedder::FixedDimEmbedder,
    filter::{FilterDecision, ParentFilter},
    reader::RecordReader,
    upsert::{FlushOutcome, UpsertEngine, UpsertStats},
};

use self::state::map_guard_error;

/// What one worker did with its shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardReport {
    pub records_read: usize,
    pub malformed_lines: usize,
    pub skipped_missing_key: usize,
    pub skipped_unknown_parent: usize,
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub rows_written: u64,
    pub records_dropped: usize,
}

impl ShardReport {
    /// True when no batch was lost. Skipped records do not count against it.
    pub fn all_batches_landed(&self) -> bool {
        self.batches_failed == 0
    }

    fn absorb(&mut self, stats: UpsertStats) {
        self.batches_committed = stats.batches_committed;
        self.batches_failed = stats.batches_failed;
        self.rows_written = stats.rows_written;
        self.records_dropped = stats.records_dropped;
    }
}

/// Loads one shard of reviews: read, filter, accumulate, embed, write.
///
/// Batches are processed strictly in file order, one transaction each.
pub struct ShardWorker<S> {
    engine: UpsertEngine<S>,
    embedder: FixedDimEmbedder,
    filter: ParentFilter,
    config: WorkerConfig,
}

impl<S: ReviewStore> ShardWorker<S> {
    pub fn new(
        store: S,
        embedder: FixedDimEmbedder,
        filter: ParentFilter,
        config: WorkerConfig,
    ) -> Self {
        Self {
            engine: UpsertEngine::new(store),
            embedder,
            filter,
            config,
        }
    }

    pub async fn run_file(&mut self, path: &Path) -> Result<ShardReport, AppError> {
        let reader = RecordReader::<_, RawReview>::open(path)?;
        info!(
            shard = %path.display(),
            filter_active = self.filter.is_active(),
            batch_size = self.config.batch_size,
            "starting review shard"
        );
        self.run(reader).await
    }

    #[instrument(
        name = "worker",
        skip_all,
        fields(worker_id = %self.config.worker_id, device = %self.config.device_label())
    )]
    pub async fn run<R: BufRead + Send>(
        &mut self,
        reader: RecordReader<R, RawReview>,
    ) -> Result<ShardReport, AppError> {
        let mut reader = reader.with_limit(self.config.max_records);
        let batch_size = self.config.batch_size.max(1);
        let mut report = ShardReport::default();
        let mut batch: Vec<ReviewRow> = Vec::with_capacity(batch_size);
        let mut batch_index = 0usize;

        for record in reader.by_ref() {
            let row = ReviewRow::from_raw(record?);
            report.records_read += 1;

            match self.filter.decide(&row) {
                FilterDecision::Accept => batch.push(row),
                FilterDecision::MissingKey => report.skipped_missing_key += 1,
                FilterDecision::UnknownParent => report.skipped_unknown_parent += 1,
            }

            if batch.len() >= batch_size {
                self.flush(std::mem::take(&mut batch), batch_index).await?;
                batch_index += 1;
            }
        }

        if !batch.is_empty() {
            self.flush(batch, batch_index).await?;
        }

        report.malformed_lines = reader.malformed();
        report.absorb(self.engine.stats());

        info!(
            records_read = report.records_read,
            malformed = report.malformed_lines,
            skipped_missing_key = report.skipped_missing_key,
            skipped_unknown_parent = report.skipped_unknown_parent,
            batches_committed = report.batches_committed,
            batches_failed = report.batches_failed,
            rows_written = report.rows_written,
            "review shard finished"
        );
        Ok(report)
    }

    async fn flush(&mut self, batch: Vec<ReviewRow>, index: usize) -> Result<FlushOutcome, AppError> {
        let machine = accumulating();
        let texts: Vec<String> = batch
            .iter()
            .map(|row| row.embedding_text().to_string())
            .collect();

        let outcome = match self.embedder.embed(&texts, self.config.embed_batch_size).await {
            Ok(vectors) => {
                let machine = machine
                    .embed()
                    .map_err(|(_, guard)| map_guard_error("embed", &guard))?;
                let outcome = self.engine.flush_reviews(&batch, &vectors).await?;
                if outcome.is_committed() {
                    machine
                        .commit()
                        .map_err(|(_, guard)| map_guard_error("commit", &guard))?;
                } else {
                    machine
                        .roll_back()
                        .map_err(|(_, guard)| map_guard_error("roll_back", &guard))?;
                }
                outcome
            }
            Err(err) if err.is_invariant() => return Err(err),
            Err(err) => {
                machine
                    .abandon()
                    .map_err(|(_, guard)| map_guard_error("abandon", &guard))?;
                self.engine.record_failure("reviews", batch.len(), &err)
            }
        };

        self.embedder.release_cache();

        match &outcome {
            FlushOutcome::Committed { rows } => info!(
                batch = index,
                records = batch.len(),
                rows,
                total = self.engine.stats().rows_written,
                "review batch committed"
            ),
            FlushOutcome::RolledBack { dropped, .. } => {
                debug!(batch = index, dropped, "review batch rolled back");
            }
        }

        Ok(outcome)
    }

    pub fn into_store(self) -> S {
        self.engine.into_store()
    }
}
