//! Chunk + embedding persistence with cosine nearest-neighbour search.

use async_trait::async_trait;

use crate::embeddings::{RunbookChunk, ScoredChunk};
use crate::error::{Error, Result};

mod memory;
#[cfg(feature = "pgvector")]
pub mod pgvector;

pub use memory::InMemoryVectorStore;
#[cfg(feature = "pgvector")]
pub use pgvector::{PgVectorStore, TableName};

/// Storage backend for embedded runbook chunks.
///
/// Implementations must tolerate concurrent calls from independent pipelines.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces a chunk by id.
    async fn store(&self, chunk: RunbookChunk) -> Result<()> {
        self.store_batch(vec![chunk]).await
    }

    /// Inserts or replaces every chunk by id.
    async fn store_batch(&self, chunks: Vec<RunbookChunk>) -> Result<()>;

    /// Atomically swaps every chunk of `source_path` for `chunks`, returning how
    /// many old chunks were removed. On error the previous chunks stay in place,
    /// and concurrent searches never observe the document half-replaced.
    async fn replace(&self, source_path: &str, chunks: Vec<RunbookChunk>) -> Result<usize>;

    /// Removes every chunk that came from `source_path`, returning how many were removed.
    async fn delete(&self, source_path: &str) -> Result<usize>;

    /// Up to `top_k` chunks ordered by descending cosine similarity to `query`.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize>;
}

/// Cosine similarity; zero-norm or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

pub(crate) fn validate_chunk(chunk: &RunbookChunk) -> Result<()> {
    if chunk.id.trim().is_empty() {
        return Err(Error::validation("chunk id must not be empty"));
    }
    if chunk.content.trim().is_empty() {
        return Err(Error::validation(format!("chunk {} has empty content", chunk.id)));
    }
    if chunk.embedding.is_empty() {
        return Err(Error::validation(format!("chunk {} has no embedding", chunk.id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let score = cosine_similarity(&[0.3, 0.4], &[0.3, 0.4]);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_opposite_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_norm_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
