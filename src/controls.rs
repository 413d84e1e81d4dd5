//! Command-line surface: provider selection, store selection and subcommands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::embedder::{CachedEmbedder, EmbeddingProvider, OpenAiEmbedder, QdrantEmbedder};
use crate::error::{Error, Result};
use crate::llm::{AnthropicProvider, LlmProvider, OpenAiProvider};
use crate::vector_store::{InMemoryVectorStore, VectorStore};

/// Top-level CLI for the `alertwise` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "alertwise",
    about = "Turn alerts into runbook-grounded troubleshooting checklists"
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "ALERTWISE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "ALERTWISE_LOG_JSON", default_value_t = false, global = true)]
    pub log_json: bool,

    /// Vector store backend
    #[arg(long, value_enum, env = "ALERTWISE_STORE", default_value = "memory", global = true)]
    pub store: StoreKind,

    /// Postgres connection string (postgres://...) for the pgvector store
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// pgvector table as `schema.table`
    #[arg(
        long,
        env = "ALERTWISE_PGVECTOR_TABLE",
        default_value = "public.runbook_chunks",
        global = true
    )]
    pub table: String,

    /// Embedding provider settings.
    #[command(flatten)]
    pub embedding: EmbeddingArgs,

    /// Generation provider settings.
    #[command(flatten)]
    pub llm: LlmArgs,

    /// Action to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Chunk, embed and store runbooks
    Ingest {
        /// Directory whose sub-directories are buckets
        #[arg(long, env = "ALERTWISE_RUNBOOK_ROOT", default_value = ".")]
        root: PathBuf,

        /// Bucket (sub-directory) to ingest
        #[arg(long)]
        bucket: String,

        /// Single document inside the bucket; all markdown files when omitted
        #[arg(long)]
        path: Option<String>,
    },
    /// Generate a checklist for one alert
    Process {
        /// Alert JSON file (`-` reads stdin)
        #[arg(long)]
        alert: PathBuf,

        /// Resource metadata JSON file for the alert's resource
        #[arg(long)]
        resource: Option<PathBuf>,

        /// Chunks to retrieve (defaults to retrieval.top_k)
        #[arg(long)]
        top_k: Option<usize>,

        /// Ingest this bucket under --root before processing (useful with the memory store)
        #[arg(long)]
        bucket: Option<String>,

        /// Directory whose sub-directories are buckets
        #[arg(long, env = "ALERTWISE_RUNBOOK_ROOT", default_value = ".")]
        root: PathBuf,

        /// Send the checklist to the configured destinations
        #[arg(long, default_value_t = false)]
        dispatch: bool,

        /// Print the generation prompt and skip the LLM call
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Print the checklist as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// Vector store backends selectable from the CLI.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Process-local store; contents vanish on exit.
    Memory,
    /// Postgres + pgvector.
    Pgvector,
}

/// Embedding backends selectable from the CLI.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/embeddings`.
    Openai,
    /// Qdrant Cloud Inference.
    Qdrant,
}

/// Generation backends selectable from the CLI.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LlmBackend {
    /// OpenAI chat completions.
    Openai,
    /// Anthropic messages.
    Anthropic,
}

/// Embedding provider flags.
#[derive(Args, Debug, Clone)]
pub struct EmbeddingArgs {
    /// Embedding backend
    #[arg(
        long,
        value_enum,
        env = "ALERTWISE_EMBEDDING_PROVIDER",
        default_value = "openai",
        global = true
    )]
    pub embedding_provider: EmbeddingBackend,

    /// OpenAI API key (embeddings and chat)
    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(
        long,
        env = "ALERTWISE_OPENAI_BASE",
        default_value = "https://api.openai.com/v1",
        global = true
    )]
    pub openai_base_url: String,

    /// Embedding model (defaults per backend)
    #[arg(long, env = "ALERTWISE_EMBEDDING_MODEL", global = true)]
    pub embedding_model: Option<String>,

    /// Optional embedding dimension override (OpenAI only)
    #[arg(long, env = "ALERTWISE_EMBEDDING_DIMENSIONS", global = true)]
    pub embedding_dimensions: Option<usize>,

    /// Qdrant Cloud API key
    #[arg(long, env = "QDRANT_API_KEY", global = true, hide_env_values = true)]
    pub qdrant_api_key: Option<String>,

    /// Qdrant inference endpoint (https://.../inference/text)
    #[arg(long, env = "QDRANT_INFERENCE_ENDPOINT", global = true)]
    pub qdrant_endpoint: Option<String>,

    /// Texts per embedding request
    #[arg(long, env = "ALERTWISE_EMBEDDING_BATCH", default_value_t = 32, global = true)]
    pub embedding_batch_size: usize,

    /// Embedding request timeout in seconds
    #[arg(long, env = "ALERTWISE_EMBEDDING_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub embedding_timeout_secs: u64,

    /// Retries for rate-limited or failed embedding requests
    #[arg(long, env = "ALERTWISE_EMBEDDING_MAX_RETRIES", default_value_t = 5, global = true)]
    pub embedding_max_retries: usize,

    /// Cached query embeddings (0 disables)
    #[arg(long, env = "ALERTWISE_QUERY_CACHE", default_value_t = 256, global = true)]
    pub query_cache: usize,
}

/// Generation provider flags.
#[derive(Args, Debug, Clone)]
pub struct LlmArgs {
    /// Generation backend
    #[arg(
        long,
        value_enum,
        env = "ALERTWISE_LLM_PROVIDER",
        default_value = "openai",
        global = true
    )]
    pub llm_provider: LlmBackend,

    /// Generation model (defaults per backend)
    #[arg(long, env = "ALERTWISE_LLM_MODEL", global = true)]
    pub llm_model: Option<String>,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", global = true, hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Base URL for the Anthropic API
    #[arg(
        long,
        env = "ALERTWISE_ANTHROPIC_BASE",
        default_value = "https://api.anthropic.com/v1",
        global = true
    )]
    pub anthropic_base_url: String,
}

const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_QDRANT_EMBEDDING_MODEL: &str = "qdrant/all-MiniLM-L6-v2";
const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

impl Cli {
    /// Builds the configured embedding backend wrapped in a query cache.
    pub fn build_embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let args = &self.embedding;
        let timeout = Duration::from_secs(args.embedding_timeout_secs.max(1));
        let batch_size = args.embedding_batch_size.max(1);
        let inner: Arc<dyn EmbeddingProvider> = match args.embedding_provider {
            EmbeddingBackend::Openai => Arc::new(OpenAiEmbedder::new(
                required(&args.openai_api_key, "OPENAI_API_KEY")?,
                args.openai_base_url.clone(),
                args.embedding_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_MODEL.to_string()),
                args.embedding_dimensions,
                timeout,
                args.embedding_max_retries,
                batch_size,
            )?),
            EmbeddingBackend::Qdrant => Arc::new(QdrantEmbedder::new(
                required(&args.qdrant_api_key, "QDRANT_API_KEY")?,
                required(&args.qdrant_endpoint, "QDRANT_INFERENCE_ENDPOINT")?,
                args.embedding_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_QDRANT_EMBEDDING_MODEL.to_string()),
                timeout,
                args.embedding_max_retries,
                batch_size,
            )?),
        };
        Ok(Arc::new(CachedEmbedder::new(inner, args.query_cache)))
    }

    /// Builds the configured generation backend.
    pub fn build_llm(&self, timeout: Duration) -> Result<Arc<dyn LlmProvider>> {
        let args = &self.llm;
        Ok(match args.llm_provider {
            LlmBackend::Openai => Arc::new(OpenAiProvider::new(
                required(&self.embedding.openai_api_key, "OPENAI_API_KEY")?,
                args.llm_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_CHAT_MODEL.to_string()),
                &self.embedding.openai_base_url,
                timeout,
            )?),
            LlmBackend::Anthropic => Arc::new(AnthropicProvider::new(
                required(&args.anthropic_api_key, "ANTHROPIC_API_KEY")?,
                args.llm_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
                &args.anthropic_base_url,
                timeout,
            )?),
        })
    }

    /// Opens the configured vector store.
    pub async fn build_store(&self) -> Result<Arc<dyn VectorStore>> {
        match self.store {
            StoreKind::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
            StoreKind::Pgvector => self.connect_pgvector().await,
        }
    }

    #[cfg(feature = "pgvector")]
    async fn connect_pgvector(&self) -> Result<Arc<dyn VectorStore>> {
        use crate::vector_store::{PgVectorStore, TableName};

        let url = required(&self.database_url, "DATABASE_URL")?;
        let table = TableName::parse(&self.table)?;
        Ok(Arc::new(PgVectorStore::connect(&url, table).await?))
    }

    #[cfg(not(feature = "pgvector"))]
    async fn connect_pgvector(&self) -> Result<Arc<dyn VectorStore>> {
        Err(Error::validation(
            "alertwise was built without the pgvector feature",
        ))
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::validation(format!("{name} must be set for the selected provider")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_process_flags() {
        let cli = Cli::try_parse_from([
            "alertwise",
            "--llm-provider",
            "anthropic",
            "process",
            "--alert",
            "alert.json",
            "--top-k",
            "3",
            "--dispatch",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.llm.llm_provider, LlmBackend::Anthropic);
        assert_eq!(cli.store, StoreKind::Memory);
        match cli.command {
            Command::Process {
                top_k,
                dispatch,
                json,
                dry_run,
                ..
            } => {
                assert_eq!(top_k, Some(3));
                assert!(dispatch && json && !dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn missing_keys_are_validation_errors() {
        let mut cli =
            Cli::try_parse_from(["alertwise", "ingest", "--bucket", "ops"]).unwrap();
        cli.embedding.openai_api_key = None;
        cli.llm.anthropic_api_key = Some("  ".into());
        cli.llm.llm_provider = LlmBackend::Anthropic;
        assert!(matches!(cli.build_embedder(), Err(Error::Validation(_))));
        assert!(matches!(
            cli.build_llm(Duration::from_secs(1)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn builds_providers_with_keys() {
        let mut cli =
            Cli::try_parse_from(["alertwise", "ingest", "--bucket", "ops"]).unwrap();
        cli.embedding.openai_api_key = Some("sk-test".into());
        let embedder = cli.build_embedder().unwrap();
        assert_eq!(embedder.provider_id(), "openai:text-embedding-3-small");
        let llm = cli.build_llm(Duration::from_secs(5)).unwrap();
        assert_eq!(llm.provider_id(), "openai:gpt-4o-mini");
    }
}
