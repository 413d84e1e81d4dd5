//! OpenAI-based embedding client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{is_retryable_error, retry_backoff, should_retry, EmbeddingProvider};
use crate::error::{Error, Result};

const SERVICE: &str = "openai-embeddings";

/// Async embeddings client that talks to OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    provider_id: String,
    dimensions: Option<usize>,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Builds a new OpenAI embeddings client.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::validation("missing OpenAI API key"));
        }
        if model.trim().is_empty() {
            return Err(Error::validation("missing OpenAI model name"));
        }
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| Error::validation("invalid OpenAI API key"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| Error::from_transport(SERVICE, err))?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            provider_id: format!("openai:{model}"),
            model,
            dimensions,
            max_retries: max_retries.max(1),
            batch_size: batch_size.max(1),
        })
    }

    /// Maximum batch size configured for this client.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
                dimensions: self.dimensions,
            };
            let response = self.client.post(&self.endpoint).json(&request).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp
                            .json()
                            .await
                            .map_err(|err| Error::from_transport(SERVICE, err))?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != inputs.len() {
                            return Err(Error::TransientExternal {
                                service: SERVICE.to_string(),
                                status: Some(status.as_u16()),
                                message: format!(
                                    "OpenAI returned {} embeddings for {} inputs",
                                    parsed.data.len(),
                                    inputs.len()
                                ),
                            });
                        }
                        return Ok(parsed
                            .data
                            .into_iter()
                            .map(|entry| entry.embedding)
                            .collect());
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tracing::warn!(attempt, %status, "retrying OpenAI embeddings request");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(Error::from_status(SERVICE, status.as_u16(), body));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tracing::warn!(attempt, error = %err, "retrying OpenAI embeddings request");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(Error::from_transport(SERVICE, err));
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_request(batch).await?);
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_credentials() {
        let err = OpenAiEmbedder::new(
            "  ".into(),
            "https://api.openai.com/v1".into(),
            "text-embedding-3-small".into(),
            None,
            Duration::from_secs(5),
            3,
            16,
        )
        .err()
        .expect("blank key rejected");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn endpoint_and_id_derive_from_config() {
        let embedder = OpenAiEmbedder::new(
            "sk-test".into(),
            "http://localhost:9000/v1/".into(),
            "text-embedding-3-small".into(),
            Some(256),
            Duration::from_secs(5),
            0,
            0,
        )
        .expect("client builds");
        assert_eq!(embedder.endpoint, "http://localhost:9000/v1/embeddings");
        assert_eq!(embedder.provider_id(), "openai:text-embedding-3-small");
        assert_eq!(embedder.batch_size(), 1);
    }
}
