#![warn(missing_docs)]
//! Alert-to-checklist pipeline: runbook chunking and retrieval, LLM checklist
//! generation, and webhook fan-out.

pub mod checklist;
pub mod chunker;
pub mod config;
pub mod controls;
pub mod dispatch;
pub mod embedder;
pub mod embeddings;
pub mod enrichment;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod retriever;
pub mod source;
pub mod telemetry;
pub mod vector_store;

#[cfg(test)]
mod test_support;

pub use checklist::{ChecklistStep, DynamicChecklist, Priority};
pub use chunker::{ChunkerConfig, DocumentChunker, RunbookHeader};
pub use config::AlertwiseConfig;
pub use controls::{Cli, Command};
pub use dispatch::{
    DestinationFilter, DestinationType, DispatchEngine, HttpTransport, TransportResponse,
    WebhookDestination, WebhookResult, WebhookTransport,
};
pub use embedder::{CachedEmbedder, EmbeddingProvider, OpenAiEmbedder, QdrantEmbedder};
pub use embeddings::{RetrievedChunk, RunbookChunk, ScoredChunk};
pub use enrichment::{Enricher, StaticEnricher};
pub use error::{Error, Result};
pub use generator::{parse_checklist_response, ChecklistGenerator, GenerationConfig};
pub use ingest::RunbookIngester;
pub use llm::{AnthropicProvider, LlmProvider, OpenAiProvider, ProviderRequest};
pub use model::{Alert, EnrichedContext, LogEntry, MetricSnapshot, ResourceMetadata, Severity};
pub use pipeline::PipelineOrchestrator;
pub use retriever::{RetrievalConfig, RunbookRetriever, ShapeMatcher};
pub use source::{DocumentSource, FsDocumentSource, MemoryDocumentSource};
pub use telemetry::init_tracing;
pub use vector_store::{cosine_similarity, InMemoryVectorStore, VectorStore};
#[cfg(feature = "pgvector")]
pub use vector_store::{PgVectorStore, TableName};
