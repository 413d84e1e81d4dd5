use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{cosine_similarity, validate_chunk, VectorStore};
use crate::embeddings::{RunbookChunk, ScoredChunk};
use crate::error::Result;

/// Process-local store; brute-force cosine search over every chunk.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    chunks: RwLock<BTreeMap<String, RunbookChunk>>,
}

impl InMemoryVectorStore {
    /// Builds an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn store_batch(&self, chunks: Vec<RunbookChunk>) -> Result<()> {
        for chunk in &chunks {
            validate_chunk(chunk)?;
        }
        let mut guard = self.chunks.write().await;
        for chunk in chunks {
            guard.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }

    async fn replace(&self, source_path: &str, chunks: Vec<RunbookChunk>) -> Result<usize> {
        for chunk in &chunks {
            validate_chunk(chunk)?;
        }
        let mut guard = self.chunks.write().await;
        let before = guard.len();
        guard.retain(|_, chunk| chunk.source_path != source_path);
        let removed = before - guard.len();
        for chunk in chunks {
            guard.insert(chunk.id.clone(), chunk);
        }
        Ok(removed)
    }

    async fn delete(&self, source_path: &str) -> Result<usize> {
        let mut guard = self.chunks.write().await;
        let before = guard.len();
        guard.retain(|_, chunk| chunk.source_path != source_path);
        Ok(before - guard.len())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let guard = self.chunks.read().await;
        let mut scored: Vec<ScoredChunk> = guard
            .values()
            .map(|chunk| ScoredChunk {
                similarity_score: cosine_similarity(query, &chunk.embedding),
                chunk: chunk.clone(),
            })
            .collect();
        drop(guard);
        scored.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().await.len())
    }
}
