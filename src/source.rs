//! Document-source collaborator seam plus filesystem and in-memory sources.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Lists and fetches runbook documents grouped into buckets.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Document paths inside `bucket`, sorted.
    async fn list_documents(&self, bucket: &str) -> Result<Vec<String>>;

    /// Full text of `path` inside `bucket`.
    async fn get_document_content(&self, bucket: &str, path: &str) -> Result<String>;
}

/// Buckets are sub-directories of `root`; paths are `/`-separated and relative to the bucket.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    /// Source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        let bucket = bucket.trim();
        if bucket.is_empty() || bucket == "." {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(checked_relative(bucket)?))
    }
}

fn checked_relative(path: &str) -> Result<&Path> {
    let candidate = Path::new(path);
    let safe = candidate
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !safe || path.trim().is_empty() {
        return Err(Error::DocumentSource(format!(
            "path '{path}' must be relative and stay inside its bucket"
        )));
    }
    Ok(candidate)
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn list_documents(&self, bucket: &str) -> Result<Vec<String>> {
        let dir = self.bucket_dir(bucket)?;
        tokio::task::spawn_blocking(move || list_files(&dir))
            .await
            .map_err(|err| Error::DocumentSource(format!("listing task failed: {err}")))?
    }

    async fn get_document_content(&self, bucket: &str, path: &str) -> Result<String> {
        let full = self.bucket_dir(bucket)?.join(checked_relative(path)?);
        tokio::fs::read_to_string(&full).await.map_err(|err| {
            Error::DocumentSource(format!("failed to read {}: {err}", full.display()))
        })
    }
}

fn list_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(Error::DocumentSource(format!(
            "bucket directory {} does not exist",
            dir.display()
        )));
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|err| Error::DocumentSource(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let joined = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        paths.push(joined);
    }
    paths.sort();
    Ok(paths)
}

/// In-process source, handy for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryDocumentSource {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MemoryDocumentSource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a document.
    pub async fn insert(&self, bucket: &str, path: &str, content: impl Into<String>) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(path.to_string(), content.into());
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn list_documents(&self, bucket: &str) -> Result<Vec<String>> {
        let guard = self.buckets.read().await;
        Ok(guard
            .get(bucket)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_document_content(&self, bucket: &str, path: &str) -> Result<String> {
        let guard = self.buckets.read().await;
        guard
            .get(bucket)
            .and_then(|docs| docs.get(path))
            .cloned()
            .ok_or_else(|| Error::DocumentSource(format!("{bucket}/{path} not found")))
    }
}
