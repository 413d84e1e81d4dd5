//! Qdrant Cloud Inference embedding client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{retry_backoff, should_retry, EmbeddingProvider};
use crate::error::{Error, Result};

const SERVICE: &str = "qdrant-inference";

/// Async embeddings client that talks to Qdrant Cloud Inference endpoints.
#[derive(Clone)]
pub struct QdrantEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    provider_id: String,
    max_retries: usize,
    batch_size: usize,
}

impl QdrantEmbedder {
    /// Builds a new Qdrant embeddings client.
    ///
    /// # Arguments
    /// * `api_key` - Value for the `api-key` header (usually from `QDRANT_API_KEY` env var)
    /// * `endpoint` - Full inference endpoint, e.g. `https://cluster-id.cloud.qdrant.io/inference/text`
    /// * `model` - Model identifier advertised by the cluster (e.g. `qdrant/all-MiniLM-L6-v2`)
    pub fn new(
        api_key: String,
        endpoint: String,
        model: String,
        timeout: Duration,
        max_retries: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::validation("missing Qdrant API key"));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(Error::validation("Qdrant endpoint must be an http(s) URL"));
        }
        if model.trim().is_empty() {
            return Err(Error::validation("missing Qdrant model name"));
        }
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| Error::validation("invalid Qdrant API key"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| Error::from_transport(SERVICE, err))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            provider_id: format!("qdrant:{model}"),
            model,
            max_retries: max_retries.max(1),
            batch_size: batch_size.max(1),
        })
    }

    async fn infer(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0usize;
        loop {
            let request = InferenceRequest {
                model: &self.model,
                inputs,
            };
            let response = self.client.post(&self.endpoint).json(&request).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let payload: InferenceResponse = resp
                            .json()
                            .await
                            .map_err(|err| Error::from_transport(SERVICE, err))?;
                        return payload.into_embeddings(inputs.len());
                    }
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(Error::from_status(SERVICE, status.as_u16(), body));
                }
                Err(err) => {
                    let transient =
                        err.is_connect() || err.is_timeout() || err.is_request() || err.is_body();
                    if transient && attempt + 1 < self.max_retries {
                        attempt += 1;
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
impl EmbeddingProvider for QdrantEmbedder {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.infer(batch).await?);
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    data: Vec<InferenceData>,
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl InferenceResponse {
    fn into_embeddings(self, expected_len: usize) -> Result<Vec<Vec<f32>>> {
        let mismatch = |got: usize| Error::TransientExternal {
            service: SERVICE.to_string(),
            status: None,
            message: format!("Qdrant returned {got} embeddings for {expected_len} inputs"),
        };
        if !self.data.is_empty() {
            if self.data.len() != expected_len {
                return Err(mismatch(self.data.len()));
            }
            let mut data = self.data;
            data.sort_by_key(|d| d.index.unwrap_or(0));
            return Ok(data.into_iter().map(|d| d.embedding).collect());
        }
        if !self.embeddings.is_empty() {
            if self.embeddings.len() != expected_len {
                return Err(mismatch(self.embeddings.len()));
            }
            return Ok(self.embeddings);
        }
        Err(mismatch(0))
    }
}

#[derive(Debug, Deserialize)]
struct InferenceData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_response_layouts() {
        let indexed: InferenceResponse = serde_json::from_str(
            r#"{"data":[{"embedding":[0.2],"index":1},{"embedding":[0.1],"index":0}]}"#,
        )
        .unwrap();
        assert_eq!(indexed.into_embeddings(2).unwrap(), vec![vec![0.1], vec![0.2]]);

        let flat: InferenceResponse = serde_json::from_str(r#"{"embeddings":[[1.0,0.0]]}"#).unwrap();
        assert_eq!(flat.into_embeddings(1).unwrap(), vec![vec![1.0, 0.0]]);
    }

    #[test]
    fn empty_payload_is_an_error() {
        let empty: InferenceResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.into_embeddings(1).is_err());
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = QdrantEmbedder::new(
            "key".into(),
            "ftp://cluster".into(),
            "qdrant/all-MiniLM-L6-v2".into(),
            Duration::from_secs(1),
            1,
            1,
        )
        .err()
        .expect("endpoint rejected");
        assert!(matches!(err, Error::Validation(_)));
    }
}
