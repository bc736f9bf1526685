use std::sync::Arc;

use async_trait::async_trait;
use common::{error::AppError, utils::embedding::EmbeddingProvider};
use tracing::debug;

/// Anything that turns texts into vectors of some native width.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    fn label(&self) -> &str;

    fn native_dimension(&self) -> usize;

    async fn embed_batch(&self, texts: Vec<String>, batch_size: usize)
        -> anyhow::Result<Vec<Vec<f32>>>;

    /// Returns cached accelerator memory to the device. Called after every
    /// flush; backends without a device cache keep the default no-op.
    fn release_cache(&self) {}
}

#[async_trait]
impl TextEmbedder for EmbeddingProvider {
    fn label(&self) -> &str {
        self.backend_label()
    }

    fn native_dimension(&self) -> usize {
        self.dimension()
    }

    async fn embed_batch(
        &self,
        texts: Vec<String>,
        batch_size: usize,
    ) -> anyhow::Result<Vec<Vec<f32>>> {
        EmbeddingProvider::embed_batch(self, texts, batch_size).await
    }
}

/// Pads with zeros or truncates `vector` to exactly `dimension` components.
pub fn fit_dimension(mut vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    vector.resize(dimension, 0.0);
    vector
}

/// Wraps a [`TextEmbedder`] so every returned vector has the stored width.
#[derive(Clone)]
pub struct FixedDimEmbedder {
    inner: Arc<dyn TextEmbedder>,
    dimension: usize,
}

impl FixedDimEmbedder {
    pub fn new(inner: Arc<dyn TextEmbedder>, dimension: usize) -> Result<Self, AppError> {
        if dimension == 0 {
            return Err(AppError::Validation(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if inner.native_dimension() != dimension {
            debug!(
                backend = inner.label(),
                native = inner.native_dimension(),
                stored = dimension,
                "embeddings will be padded or truncated to the stored width"
            );
        }
        Ok(Self { inner, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn label(&self) -> &str {
        self.inner.label()
    }

    /// One vector per text, in input order. Backend failures come back as
    /// [`AppError::Embedding`]; a backend returning the wrong number of
    /// vectors is an [`AppError::Invariant`].
    pub async fn embed(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .inner
            .embed_batch(texts.to_vec(), batch_size)
            .await
            .map_err(|err| AppError::Embedding(format!("{}: {err:#}", self.inner.label())))?;

        if vectors.len() != texts.len() {
            return Err(AppError::Invariant(format!(
                "{} backend returned {} vectors for {} texts",
                self.inner.label(),
                vectors.len(),
                texts.len()
            )));
        }

        Ok(vectors
            .into_iter()
            .map(|vector| fit_dimension(vector, self.dimension))
            .collect())
    }

    pub fn release_cache(&self) {
        self.inner.release_cache();
    }
}
