//! Deterministic collaborators shared by unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::{TransportResponse, WebhookTransport};
use crate::embedder::EmbeddingProvider;
use crate::embeddings::RunbookChunk;
use crate::error::{Error, Result};
use crate::llm::{LlmProvider, ProviderRequest};

pub(crate) fn chunk(id: &str, source_path: &str, embedding: Vec<f32>) -> RunbookChunk {
    RunbookChunk {
        id: id.to_string(),
        source_path: source_path.to_string(),
        section_title: "Section".to_string(),
        content: format!("content of {id}"),
        tags: Default::default(),
        applicable_shape_patterns: Vec::new(),
        embedding,
    }
}

const STUB_DIMS: usize = 16;

/// Bag-of-words hashing embedder, or a fixed vector when built with [`StubEmbedder::fixed`].
#[derive(Default)]
pub(crate) struct StubEmbedder {
    fixed: Option<Vec<f32>>,
    fail: bool,
    calls: AtomicUsize,
}

impl StubEmbedder {
    pub(crate) fn fixed(vector: Vec<f32>) -> Self {
        Self {
            fixed: Some(vector),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of texts embedded so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(fixed) = &self.fixed {
            return fixed.clone();
        }
        let mut vector = vec![0.0f32; STUB_DIMS];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let slot = crc32fast::hash(word.as_bytes()) as usize % STUB_DIMS;
            vector[slot] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn provider_id(&self) -> &str {
        "stub:embedder"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(Error::TransientExternal {
                service: "stub-embedder".to_string(),
                status: Some(503),
                message: "embedding backend unavailable".to_string(),
            });
        }
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}

/// LLM returning a canned response and recording the prompts it saw.
pub(crate) struct ScriptedLlm {
    response: std::result::Result<String, u16>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub(crate) fn new(response: impl Into<String>) -> Self {
        Self {
            response: Ok(response.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call with the given HTTP status.
    pub(crate) fn failing(status: u16) -> Self {
        Self {
            response: Err(status),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn provider_id(&self) -> &str {
        "stub:llm"
    }

    async fn generate(&self, request: &ProviderRequest<'_>) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(Error::from_status("stub-llm", *status, "scripted failure")),
        }
    }
}

/// Outcome scripted for one webhook attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Scripted {
    Status(u16),
    ConnectionRefused,
}

/// Transport replaying per-URL outcome sequences; the last outcome repeats.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    attempts: Mutex<HashMap<String, usize>>,
    bodies: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub(crate) fn script(self, url: &str, outcomes: &[Scripted]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), outcomes.iter().copied().collect());
        self
    }

    pub(crate) fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub(crate) fn bodies(&self) -> Vec<(String, Value)> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn post(
        &self,
        url: &str,
        _headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<TransportResponse> {
        *self.attempts.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.bodies
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        let outcome = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().copied(),
                None => None,
            }
        };
        match outcome.unwrap_or(Scripted::Status(200)) {
            Scripted::Status(status) => Ok(TransportResponse {
                status,
                body: String::new(),
            }),
            Scripted::ConnectionRefused => Err(Error::TransientExternal {
                service: url.to_string(),
                status: None,
                message: "connection refused".to_string(),
            }),
        }
    }
}
