use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use common::{
    error::AppError,
    storage::{
        store::ReviewStore,
        types::{MetadataRow, ReviewRow},
    },
};

type ReviewKey = (Option<String>, Option<String>, NaiveDateTime);

/// In-memory [`ReviewStore`] mirroring the reference schema: metadata is
/// overwritten on `parent_asin` conflict, reviews are ignored on
/// `(asin, user_id, ts)` conflict. Selected batch calls can be made to fail,
/// in which case nothing from that call is kept.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    metadata: BTreeMap<String, MetadataRow>,
    reviews: Vec<(ReviewRow, Vec<f32>)>,
    review_keys: HashSet<ReviewKey>,
    metadata_calls: usize,
    review_calls: usize,
    failing_metadata: HashSet<usize>,
    failing_reviews: HashSet<usize>,
}

impl MemoryStore {
    /// Review calls with these zero-based indices fail.
    pub(crate) fn fail_review_batches(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.failing_reviews.extend(calls);
        self
    }

    pub(crate) fn fail_metadata_batches(
        mut self,
        calls: impl IntoIterator<Item = usize>,
    ) -> Self {
        self.failing_metadata.extend(calls);
        self
    }

    pub(crate) fn metadata_len(&self) -> usize {
        self.metadata.len()
    }

    pub(crate) fn metadata_title(&self, key: &str) -> Option<String> {
        self.metadata.get(key).and_then(|row| row.title.clone())
    }

    pub(crate) fn metadata_rows(&self) -> Vec<MetadataRow> {
        self.metadata.values().cloned().collect()
    }

    pub(crate) fn reviews(&self) -> &[(ReviewRow, Vec<f32>)] {
        &self.reviews
    }

    pub(crate) fn review_calls(&self) -> usize {
        self.review_calls
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn upsert_metadata(&mut self, rows: &[MetadataRow]) -> Result<u64, AppError> {
        let call = self.metadata_calls;
        self.metadata_calls += 1;
        if self.failing_metadata.contains(&call) {
            return Err(AppError::InternalError(format!(
                "simulated failure of metadata batch {call}"
            )));
        }
        for row in rows {
            self.metadata.insert(row.parent_asin.clone(), row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn insert_reviews(
        &mut self,
        rows: &[ReviewRow],
        embeddings: &[Vec<f32>],
    ) -> Result<u64, AppError> {
        if rows.len() != embeddings.len() {
            return Err(AppError::Invariant(format!(
                "{} embeddings supplied for {} review rows",
                embeddings.len(),
                rows.len()
            )));
        }
        let call = self.review_calls;
        self.review_calls += 1;
        if self.failing_reviews.contains(&call) {
            return Err(AppError::InternalError(format!(
                "simulated constraint violation in review batch {call}"
            )));
        }

        let mut written = 0u64;
        for (row, embedding) in rows.iter().zip(embeddings) {
            if let Some(ts) = row.ts {
                let key = (row.asin.clone(), row.user_id.clone(), ts);
                if !self.review_keys.insert(key) {
                    continue;
                }
            }
            self.reviews.push((row.clone(), embedding.clone()));
            written += 1;
        }
        Ok(written)
    }
}
