use common::{
    error::AppError,
    storage::{
        store::ReviewStore,
        types::{MetadataRow, ReviewRow},
    },
};
use tracing::error;

/// Per-engine batch accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub rows_written: u64,
    pub records_dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Committed { rows: u64 },
    RolledBack { dropped: usize, reason: String },
}

impl FlushOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Writes batches through a [`ReviewStore`] with a drop-and-continue policy.
///
/// A failed batch is logged, counted and dropped; the engine stays usable
/// for the next batch. Invariant violations are never contained.
pub struct UpsertEngine<S> {
    store: S,
    stats: UpsertStats,
}

impl<S: ReviewStore> UpsertEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            stats: UpsertStats::default(),
        }
    }

    pub async fn flush_metadata(&mut self, rows: &[MetadataRow]) -> Result<FlushOutcome, AppError> {
        let result = self.store.upsert_metadata(rows).await;
        self.settle("metadata", rows.len(), result)
    }

    pub async fn flush_reviews(
        &mut self,
        rows: &[ReviewRow],
        embeddings: &[Vec<f32>],
    ) -> Result<FlushOutcome, AppError> {
        let result = self.store.insert_reviews(rows, embeddings).await;
        self.settle("reviews", rows.len(), result)
    }

    /// Accounts for a batch that failed before reaching the store, such as
    /// an embedding backend error.
    pub fn record_failure(&mut self, kind: &str, dropped: usize, err: &AppError) -> FlushOutcome {
        self.stats.batches_failed += 1;
        self.stats.records_dropped += dropped;
        error!(kind, dropped, error = %err, "batch failed; records dropped");
        FlushOutcome::RolledBack {
            dropped,
            reason: err.to_string(),
        }
    }

    fn settle(
        &mut self,
        kind: &str,
        batch_len: usize,
        result: Result<u64, AppError>,
    ) -> Result<FlushOutcome, AppError> {
        match result {
            Ok(rows) => {
                self.stats.batches_committed += 1;
                self.stats.rows_written += rows;
                Ok(FlushOutcome::Committed { rows })
            }
            Err(err) if err.is_invariant() => Err(err),
            Err(err) => Ok(self.record_failure(kind, batch_len, &err)),
        }
    }

    pub fn stats(&self) -> UpsertStats {
        self.stats
    }

    /// Returns the counters accumulated so far and resets them.
    pub fn take_stats(&mut self) -> UpsertStats {
        std::mem::take(&mut self.stats)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
