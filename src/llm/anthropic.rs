use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, ProviderRequest};
use crate::error::{Error, Result};

const SERVICE: &str = "anthropic-messages";

/// Anthropic messages API backend.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    endpoint: String,
    provider_id: String,
    client: Client,
}

impl AnthropicProvider {
    /// Builds a provider against `base_url` (e.g. `https://api.anthropic.com/v1`).
    pub fn new(api_key: String, model: String, base_url: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::validation(
                "ANTHROPIC_API_KEY must be set for the Anthropic provider",
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::from_transport(SERVICE, err))?;
        Ok(Self {
            api_key,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
            provider_id: format!("anthropic:{model}"),
            model,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn generate(&self, request: &ProviderRequest<'_>) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.api_key.trim())
                .map_err(|_| Error::validation("invalid Anthropic API key"))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: request.prompt,
                }],
            }],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::from_transport(SERVICE, err))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::from_status(SERVICE, status.as_u16(), text));
        }
        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|err| Error::from_transport(SERVICE, err))?;
        Ok(parsed.text())
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

impl AnthropicResponse {
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let parsed: AnthropicResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Step 1: a"},{"type":"tool_use","id":"x"},{"type":"text","text":"Step 2: b"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text(), "Step 1: a\nStep 2: b");
    }
}
