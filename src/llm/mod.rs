//! Text-generation backends used to draft checklists.

use async_trait::async_trait;

use crate::error::Result;

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Trait implemented by concrete LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Identifier copied into generated checklists (e.g. `anthropic:claude-3-haiku`).
    fn provider_id(&self) -> &str;

    /// Completes `request.prompt`, returning the raw response text.
    async fn generate(&self, request: &ProviderRequest<'_>) -> Result<String>;
}

/// Request envelope shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// Instructions pinned ahead of the prompt.
    pub system: &'a str,
    /// Fully rendered user prompt.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token limit.
    pub max_tokens: usize,
}
