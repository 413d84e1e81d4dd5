//! Alert-driven runbook retrieval: embed, over-fetch, then re-rank with metadata boosts.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::embedder::EmbeddingProvider;
use crate::embeddings::{RetrievedChunk, ScoredChunk};
use crate::error::{Error, Result};
use crate::model::EnrichedContext;
use crate::vector_store::VectorStore;

const PATTERN_CACHE_CAPACITY: usize = 256;

/// Ranking knobs for [`RunbookRetriever`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks returned when the caller does not choose.
    pub top_k: usize,
    /// Candidates fetched per requested chunk before re-ranking.
    pub over_fetch_multiplier: usize,
    /// Boost per matching tag.
    pub tag_boost_weight: f32,
    /// Cap on the summed tag boost.
    pub tag_boost_max: f32,
    /// Boost when any shape pattern matches the resource shape.
    pub shape_boost_weight: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            over_fetch_multiplier: 2,
            tag_boost_weight: 0.1,
            tag_boost_max: 0.3,
            shape_boost_weight: 0.2,
        }
    }
}

impl RetrievalConfig {
    /// Rejects settings that cannot rank sensibly.
    pub fn validate(&self) -> Result<()> {
        if self.over_fetch_multiplier == 0 {
            return Err(Error::validation(
                "retrieval.over_fetch_multiplier must be at least 1",
            ));
        }
        let weights = [
            ("tag_boost_weight", self.tag_boost_weight),
            ("tag_boost_max", self.tag_boost_max),
            ("shape_boost_weight", self.shape_boost_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::validation(format!(
                    "retrieval.{name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

/// Glob matcher for host shape patterns; compiled patterns are cached by source string.
///
/// `*` matches any sequence, everything else is literal, and matching is
/// anchored and case-insensitive.
pub struct ShapeMatcher {
    compiled: Mutex<LruCache<String, Arc<Regex>>>,
}

impl Default for ShapeMatcher {
    fn default() -> Self {
        Self::with_capacity(PATTERN_CACHE_CAPACITY)
    }
}

impl ShapeMatcher {
    /// Matcher caching up to `capacity` distinct patterns.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            compiled: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// True when `shape` matches the glob `pattern`.
    pub fn matches(&self, pattern: &str, shape: &str) -> bool {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return false;
        }
        match self.compile(pattern) {
            Some(regex) => regex.is_match(shape.trim()),
            None => false,
        }
    }

    /// True when any of `patterns` matches `shape`.
    pub fn any_match(&self, patterns: &[String], shape: &str) -> bool {
        patterns.iter().any(|pattern| self.matches(pattern, shape))
    }

    fn compile(&self, pattern: &str) -> Option<Arc<Regex>> {
        let mut cache = match self.compiled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(hit) = cache.get(pattern) {
            return Some(Arc::clone(hit));
        }
        match Regex::new(&glob_to_regex(pattern)) {
            Ok(regex) => {
                let regex = Arc::new(regex);
                cache.put(pattern.to_string(), Arc::clone(&regex));
                Some(regex)
            }
            Err(err) => {
                tracing::warn!(pattern, error = %err, "ignoring invalid shape pattern");
                None
            }
        }
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?i)^");
    for (idx, literal) in pattern.split('*').enumerate() {
        if idx > 0 {
            out.push_str(".*");
        }
        out.push_str(&regex::escape(literal));
    }
    out.push('$');
    out
}

/// Retrieves runbook chunks relevant to an enriched alert.
pub struct RunbookRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
    shapes: ShapeMatcher,
}

impl RunbookRetriever {
    /// Builds a retriever over the given collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            embedder,
            store,
            config,
            shapes: ShapeMatcher::default(),
        })
    }

    /// Active ranking configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Up to `top_k` chunks ranked by similarity plus metadata boost.
    pub async fn retrieve(
        &self,
        context: &EnrichedContext,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query = build_query(context);
        let embedding = self.embedder.embed(&query).await?;
        let fetch = top_k.saturating_mul(self.config.over_fetch_multiplier);
        let candidates = self.store.search(&embedding, fetch).await?;
        tracing::debug!(
            alert_id = %context.alert.id,
            candidates = candidates.len(),
            fetch,
            "retrieved candidates"
        );
        Ok(self.rerank(context, candidates, top_k))
    }

    /// Applies metadata boosts and keeps the best `top_k`.
    pub fn rerank(
        &self,
        context: &EnrichedContext,
        candidates: Vec<ScoredChunk>,
        top_k: usize,
    ) -> Vec<RetrievedChunk> {
        let terms = context_terms(context);
        let shape = context.shape();
        let mut ranked: Vec<RetrievedChunk> = candidates
            .into_iter()
            .map(|scored| {
                let boost = self.metadata_boost(&scored, &terms, shape);
                RetrievedChunk::new(scored, boost)
            })
            .collect();
        // sort_by is stable, so equal scores keep store order.
        ranked.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| b.similarity_score.total_cmp(&a.similarity_score))
        });
        ranked.truncate(top_k);
        ranked
    }

    fn metadata_boost(
        &self,
        scored: &ScoredChunk,
        terms: &BTreeSet<String>,
        shape: Option<&str>,
    ) -> f32 {
        let tag_matches = scored
            .chunk
            .tags
            .iter()
            .filter(|tag| terms.contains(&tag.trim().to_lowercase()))
            .count();
        let tag_boost =
            (tag_matches as f32 * self.config.tag_boost_weight).min(self.config.tag_boost_max);
        let shape_boost = match shape {
            Some(shape)
                if self
                    .shapes
                    .any_match(&scored.chunk.applicable_shape_patterns, shape) =>
            {
                self.config.shape_boost_weight
            }
            _ => 0.0,
        };
        tag_boost + shape_boost
    }
}

/// Query text embedded for retrieval.
pub fn build_query(context: &EnrichedContext) -> String {
    let alert = &context.alert;
    let mut parts: Vec<&str> = vec![alert.title.as_str(), alert.message.as_str()];
    if let Some(resource_id) = alert.resource_id.as_deref() {
        parts.push(resource_id);
    }
    if let Some(resource) = &context.resource {
        if alert.resource_id.as_deref() != Some(resource.resource_id.as_str()) {
            parts.push(&resource.resource_id);
        }
        for value in [&resource.display_name, &resource.resource_type, &resource.shape]
            .into_iter()
            .flatten()
        {
            parts.push(value);
        }
    }
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-cased terms a chunk tag may match: alert labels, resource attributes and title words.
fn context_terms(context: &EnrichedContext) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();
    let mut add = |value: &str| {
        let value = value.trim().to_lowercase();
        if !value.is_empty() {
            terms.insert(value);
        }
    };
    for (key, value) in &context.alert.labels {
        add(key);
        add(value);
    }
    if let Some(resource) = &context.resource {
        for value in [&resource.resource_type, &resource.shape].into_iter().flatten() {
            add(value);
        }
        for (key, value) in &resource.tags {
            add(key);
            add(value);
        }
    }
    for token in context
        .alert
        .title
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|tok| tok.len() >= 3)
    {
        add(token);
    }
    terms.insert(context.alert.severity.as_str().to_lowercase());
    terms
}
