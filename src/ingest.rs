//! Runbook ingestion: fetch, chunk, embed, then replace the document's chunks.

use std::sync::Arc;

use crate::chunker::DocumentChunker;
use crate::embedder::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::source::DocumentSource;
use crate::vector_store::VectorStore;

/// Loads runbooks from a [`DocumentSource`] into a [`VectorStore`].
pub struct RunbookIngester {
    source: Arc<dyn DocumentSource>,
    chunker: DocumentChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl RunbookIngester {
    /// Wires the ingestion collaborators together.
    pub fn new(
        source: Arc<dyn DocumentSource>,
        chunker: DocumentChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            source,
            chunker,
            embedder,
            store,
        }
    }

    /// Ingests one document and returns how many chunks now represent it.
    ///
    /// Existing chunks for `path` are removed first, so re-ingesting the same
    /// content leaves the store unchanged.
    pub async fn ingest(&self, bucket: &str, path: &str) -> Result<usize> {
        let text = self.source.get_document_content(bucket, path).await?;
        let chunks = self.chunker.chunk(&text, path);
        let embedded = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != chunks.len() {
                return Err(Error::TransientExternal {
                    service: self.embedder.provider_id().to_string(),
                    status: None,
                    message: format!(
                        "expected {} embeddings, received {}",
                        chunks.len(),
                        vectors.len()
                    ),
                });
            }
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| chunk.with_embedding(vector))
                .collect()
        };

        let count = embedded.len();
        let removed = self.store.replace(path, embedded).await?;
        tracing::info!(bucket, source_path = path, chunks = count, removed, "ingested runbook");
        Ok(count)
    }

    /// Ingests every markdown document in `bucket`; failing documents are logged and skipped.
    pub async fn ingest_all(&self, bucket: &str) -> Result<usize> {
        let documents = self.source.list_documents(bucket).await?;
        let mut total = 0usize;
        let mut failed = 0usize;
        for path in documents.iter().filter(|path| is_markdown(path)) {
            match self.ingest(bucket, path).await {
                Ok(count) => total += count,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(bucket, source_path = %path, error = %err, "skipping runbook");
                }
            }
        }
        tracing::info!(bucket, documents = documents.len(), failed, chunks = total, "bucket ingested");
        Ok(total)
    }
}

fn is_markdown(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    lowered.ends_with(".md") || lowered.ends_with(".markdown")
}
