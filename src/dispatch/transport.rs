use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;

use crate::error::{Error, Result};

/// Status and body of a completed webhook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, possibly truncated.
    pub body: String,
}

impl TransportResponse {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers a JSON body to a URL. Any completed HTTP exchange is `Ok`,
/// whatever its status; `Err` means the request never produced a response.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POSTs `body` with `headers` to `url`.
    async fn post(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<TransportResponse>;
}

const MAX_ERROR_BODY: usize = 512;

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::from_transport("webhook", err))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<TransportResponse> {
        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| Error::validation(format!("invalid header name {key}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::validation(format!("invalid value for header {key}")))?;
            header_map.insert(name, value);
        }
        let resp = self
            .client
            .post(url)
            .headers(header_map)
            .json(body)
            .send()
            .await
            .map_err(|err| Error::from_transport(url, err))?;
        let status = resp.status().as_u16();
        let mut text = if resp.status().is_success() {
            String::new()
        } else {
            resp.text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string())
        };
        if text.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Ok(TransportResponse { status, body: text })
    }
}
