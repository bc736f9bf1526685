use async_trait::async_trait;

use crate::error::AppError;

use super::types::{MetadataRow, ReviewRow};

/// Transactional sink for loaded records.
///
/// Every call is exactly one transaction: either all rows of the call are
/// committed or none are. Implementations return the number of rows the
/// store reports as written (conflicting reviews that were ignored do not
/// count).
#[async_trait]
pub trait ReviewStore: Send {
    async fn upsert_metadata(&mut self, rows: &[MetadataRow]) -> Result<u64, AppError>;

    /// `embeddings[i]` belongs to `rows[i]`; mismatched lengths are an
    /// [`AppError::Invariant`].
    async fn insert_reviews(
        &mut self,
        rows: &[ReviewRow],
        embeddings: &[Vec<f32>],
    ) -> Result<u64, AppError>;
}

pub(crate) fn ensure_aligned(rows: usize, embeddings: usize) -> Result<(), AppError> {
    if rows == embeddings {
        Ok(())
    } else {
        Err(AppError::Invariant(format!(
            "{embeddings} embeddings supplied for {rows} review rows"
        )))
    }
}
