//! Shared chunk records passed between ingestion, the vector store and retrieval.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Runbook excerpt plus metadata and its embedding, as persisted by vector stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunbookChunk {
    /// Deterministic chunk identifier (`{source_path}#{index}-{crc32}`).
    pub id: String,
    /// Path of the source document inside its bucket.
    pub source_path: String,
    /// Heading the chunk was cut from.
    pub section_title: String,
    /// Chunk body text submitted to the embedding model.
    pub content: String,
    /// Tags declared in the document header.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Host shape globs the runbook applies to.
    #[serde(default)]
    pub applicable_shape_patterns: Vec<String>,
    /// Model embedding vector (empty until ingestion embeds the chunk).
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl RunbookChunk {
    /// Returns a copy of the chunk carrying `embedding`.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// Vector store hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredChunk {
    /// Matched chunk.
    pub chunk: RunbookChunk,
    /// Cosine similarity to the query embedding.
    pub similarity_score: f32,
}

/// Re-ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    /// Retrieved chunk.
    pub chunk: RunbookChunk,
    /// Cosine similarity to the query embedding.
    pub similarity_score: f32,
    /// Boost earned from tag and shape matches (never negative).
    pub metadata_boost: f32,
    /// `similarity_score + metadata_boost`.
    pub final_score: f32,
}

impl RetrievedChunk {
    /// Combines a store hit with its metadata boost.
    pub fn new(scored: ScoredChunk, metadata_boost: f32) -> Self {
        let metadata_boost = metadata_boost.max(0.0);
        Self {
            final_score: scored.similarity_score + metadata_boost,
            similarity_score: scored.similarity_score,
            metadata_boost,
            chunk: scored.chunk,
        }
    }
}
