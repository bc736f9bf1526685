use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use async_openai::{types::CreateEmbeddingRequestArgs, Client};
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::config::AppConfig;

pub const DEFAULT_FASTEMBED_MODEL: &str = "nomic-ai/nomic-embed-text-v1.5";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Read from config through `FromStr`, so aliases such as `fast-embed` are
/// accepted in files and the environment alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum EmbeddingBackend {
    OpenAI,
    FastEmbed,
    Hashed,
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        Self::FastEmbed
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::FastEmbed => write!(f, "fastembed"),
            Self::Hashed => write!(f, "hashed"),
        }
    }
}

impl FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hashed" => Ok(Self::Hashed),
            "fastembed" | "fast-embed" | "fast" => Ok(Self::FastEmbed),
            other => Err(anyhow!(
                "unknown embedding backend '{other}'. Expected 'openai', 'hashed', or 'fastembed'."
            )),
        }
    }
}

impl TryFrom<String> for EmbeddingBackend {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The text-to-vector capability. Vectors come back at the backend's native
/// width; fitting them to the stored dimension is the caller's concern.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAI {
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
    },
    Hashed {
        dimension: usize,
    },
    FastEmbed {
        model: Arc<Mutex<TextEmbedding>>,
        model_name: EmbeddingModel,
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::Hashed { .. } => "hashed",
            EmbeddingInner::FastEmbed { .. } => "fastembed",
            EmbeddingInner::OpenAI { .. } => "openai",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => *dimension,
            EmbeddingInner::FastEmbed { dimension, .. } => *dimension,
            EmbeddingInner::OpenAI { dimensions, .. } => *dimensions as usize,
        }
    }

    pub fn model_code(&self) -> Option<String> {
        match &self.inner {
            EmbeddingInner::FastEmbed { model_name, .. } => Some(model_name.to_string()),
            EmbeddingInner::OpenAI { model, .. } => Some(model.clone()),
            EmbeddingInner::Hashed { .. } => None,
        }
    }

    /// Embeds `texts` in order, handing the backend at most `batch_size`
    /// inputs per call.
    pub async fn embed_batch(&self, texts: Vec<String>, batch_size: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batch_size = batch_size.max(1);

        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .into_iter()
                .map(|text| hashed_embedding(&text, *dimension))
                .collect()),
            EmbeddingInner::FastEmbed { model, .. } => {
                let mut guard = model.lock().await;
                guard
                    .embed(texts, Some(batch_size))
                    .context("generating fastembed batch embeddings")
            }
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            } => {
                let mut embeddings = Vec::with_capacity(texts.len());
                for chunk in texts.chunks(batch_size) {
                    let request = CreateEmbeddingRequestArgs::default()
                        .model(model.clone())
                        .input(chunk.to_vec())
                        .dimensions(*dimensions)
                        .build()?;

                    let response = client.embeddings().create(request).await?;
                    embeddings.extend(response.data.into_iter().map(|item| item.embedding));
                }

                debug!(
                    requested = texts.len(),
                    received = embeddings.len(),
                    "openai embeddings received"
                );

                Ok(embeddings)
            }
        }
    }

    /// Builds the provider selected by `embedding_backend`.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        match config.embedding_backend {
            EmbeddingBackend::Hashed => Self::new_hashed(config.embedding_dimension),
            EmbeddingBackend::FastEmbed => {
                Self::new_fastembed(config.embedding_model.clone()).await
            }
            EmbeddingBackend::OpenAI => {
                let api_key = config
                    .openai_api_key
                    .as_deref()
                    .ok_or_else(|| anyhow!("OPENAI_API_KEY is required for the openai backend"))?;
                let client = Arc::new(Client::with_config(
                    async_openai::config::OpenAIConfig::new()
                        .with_api_key(api_key)
                        .with_api_base(&config.openai_base_url),
                ));
                let model = config
                    .embedding_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
                let dimensions = u32::try_from(config.embedding_dimension)
                    .context("embedding dimension exceeds u32")?;
                Self::new_openai(client, model, dimensions)
            }
        }
    }

    pub fn new_openai(
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
    ) -> Result<Self> {
        Ok(EmbeddingProvider {
            inner: EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            },
        })
    }

    pub async fn new_fastembed(model_override: Option<String>) -> Result<Self> {
        let code = model_override.unwrap_or_else(|| DEFAULT_FASTEMBED_MODEL.to_string());
        let model_name = EmbeddingModel::from_str(&code).map_err(|err| anyhow!(err))?;

        let options = TextInitOptions::new(model_name.clone()).with_show_download_progress(true);
        let model_name_for_task = model_name.clone();
        let model_name_code = model_name.to_string();

        let (model, dimension) = tokio::task::spawn_blocking(move || -> Result<_> {
            let model =
                TextEmbedding::try_new(options).context("initialising FastEmbed text model")?;
            let info = EmbeddingModel::get_model_info(&model_name_for_task)
                .ok_or_else(|| anyhow!("FastEmbed model metadata missing for {model_name_code}"))?;
            Ok((model, info.dim))
        })
        .await
        .context("joining FastEmbed initialisation task")??;

        Ok(EmbeddingProvider {
            inner: EmbeddingInner::FastEmbed {
                model: Arc::new(Mutex::new(model)),
                model_name,
                dimension,
            },
        })
    }

    pub fn new_hashed(dimension: usize) -> Result<Self> {
        Ok(EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
        })
    }
}

// Helper functions for hashed embeddings
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    let mut token_count = 0f32;
    for token in tokens(text) {
        token_count += 1.0;
        let idx = bucket(&token, dim);
        vector[idx] += 1.0;
    }

    if token_count == 0.0 {
        return vector;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_backend_is_deterministic_and_order_preserving() {
        let provider = EmbeddingProvider::new_hashed(32).expect("hashed provider");
        let texts = vec![
            "great blender".to_string(),
            String::new(),
            "great blender".to_string(),
        ];
        let vectors = provider
            .embed_batch(texts, 2)
            .await
            .expect("embedding succeeds");

        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 32));
        assert_eq!(vectors[0], vectors[2]);
        assert!(vectors[1].iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn empty_input_returns_empty_output() {
        let provider = EmbeddingProvider::new_hashed(8).expect("hashed provider");
        let vectors = provider
            .embed_batch(Vec::new(), 16)
            .await
            .expect("embedding succeeds");
        assert!(vectors.is_empty());
    }

    #[test]
    fn backend_parses_aliases_and_round_trips_display() {
        for backend in [
            EmbeddingBackend::OpenAI,
            EmbeddingBackend::FastEmbed,
            EmbeddingBackend::Hashed,
        ] {
            let parsed: EmbeddingBackend = backend.to_string().parse().expect("parse");
            assert_eq!(parsed, backend);
        }
        assert_eq!(
            "fast-embed".parse::<EmbeddingBackend>().expect("alias"),
            EmbeddingBackend::FastEmbed
        );
        assert!("word2vec".parse::<EmbeddingBackend>().is_err());
    }

    #[tokio::test]
    async fn openai_backend_requires_api_key() {
        let config = AppConfig {
            embedding_backend: EmbeddingBackend::OpenAI,
            openai_api_key: None,
            ..Default::default()
        };
        assert!(EmbeddingProvider::from_config(&config).await.is_err());
    }
}
