//! Embedding backends used for runbook ingestion and query embedding.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{Error, Result};

pub mod cache;
pub mod openai;
pub mod qdrant;

pub use cache::CachedEmbedder;
pub use openai::OpenAiEmbedder;
pub use qdrant::QdrantEmbedder;

/// Text-to-vector capability implemented by each embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable backend identifier (e.g. `openai:text-embedding-3-small`).
    fn provider_id(&self) -> &str;

    /// Embeds a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| Error::TransientExternal {
            service: self.provider_id().to_string(),
            status: None,
            message: "provider returned no embedding".to_string(),
        })
    }
}

pub(crate) fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request() || err.is_decode()
}

pub(crate) fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}
