//! LRU cache in front of an embedding backend for repeated query texts.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

use super::EmbeddingProvider;
use crate::error::Result;

/// Caches single-text embeddings; batch calls pass straight through.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl CachedEmbedder {
    /// Wraps `inner` with a cache of `capacity` entries (0 disables caching).
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            inner,
            cache: NonZeroUsize::new(capacity).map(|capacity| Mutex::new(LruCache::new(capacity))),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    fn provider_id(&self) -> &str {
        self.inner.provider_id()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_batch(texts).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().await.get(text).cloned() {
                return Ok(hit);
            }
        }
        let embedding = self.inner.embed(text).await?;
        if let Some(cache) = &self.cache {
            cache.lock().await.put(text.to_string(), embedding.clone());
        }
        Ok(embedding)
    }
}
