use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Embedding error: {0}")]
    Embedding(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invariant violated: {0}")]
    Invariant(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether the error signals a broken pipeline invariant rather than a
    /// recoverable, batch-scoped failure.
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}
