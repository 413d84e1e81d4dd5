//! TOML configuration for retrieval, generation, chunking and destinations.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunker::ChunkerConfig;
use crate::dispatch::WebhookDestination;
use crate::error::{Error, Result};
use crate::generator::GenerationConfig;
use crate::retriever::RetrievalConfig;

/// Top-level configuration file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertwiseConfig {
    /// `[retrieval]` ranking settings.
    pub retrieval: RetrievalConfig,
    /// `[generation]` sampling settings.
    pub generation: GenerationConfig,
    /// `[chunking]` size policy.
    pub chunking: ChunkerConfig,
    /// `[[destinations]]` webhook targets.
    pub destinations: Vec<WebhookDestination>,
}

impl AlertwiseConfig {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|err| Error::validation(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::validation(format!("failed to read config {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Cross-field checks; every section validates its own values.
    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;
        self.generation.validate()?;
        if self.chunking.min_chunk_chars > self.chunking.max_chunk_chars {
            return Err(Error::validation(
                "chunking.min_chunk_chars must not exceed chunking.max_chunk_chars",
            ));
        }
        if self.chunking.max_chunk_chars == 0 {
            return Err(Error::validation("chunking.max_chunk_chars must be positive"));
        }
        let mut names = HashSet::new();
        for destination in &self.destinations {
            destination.validate()?;
            if !names.insert(destination.name.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate destination name {}",
                    destination.name
                )));
            }
        }
        Ok(())
    }
}
