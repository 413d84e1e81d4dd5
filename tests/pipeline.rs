use std::sync::{Arc, Mutex};

use alertwise::{
    Alert, ChecklistGenerator, DocumentChunker, EmbeddingProvider, Enricher, FsDocumentSource,
    GenerationConfig, InMemoryVectorStore, LlmProvider, PipelineOrchestrator, Priority,
    ProviderRequest, ResourceMetadata, Result, RetrievalConfig, RunbookIngester,
    RunbookRetriever, Severity, StaticEnricher, VectorStore,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;

const KEYWORDS: [&str; 4] = ["cpu", "disk", "memory", "network"];

/// Counts keyword occurrences plus a constant bias component.
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn provider_id(&self) -> &str {
        "test:keywords"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lowered = text.to_lowercase();
                let mut vector: Vec<f32> = KEYWORDS
                    .iter()
                    .map(|word| lowered.matches(word).count() as f32)
                    .collect();
                vector.push(0.1);
                vector
            })
            .collect())
    }
}

struct RecordingLlm {
    response: String,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmProvider for RecordingLlm {
    fn provider_id(&self) -> &str {
        "test:llm"
    }

    async fn generate(&self, request: &ProviderRequest<'_>) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        Ok(self.response.clone())
    }
}

const CPU_RUNBOOK: &str = "---
title: CPU saturation
tags: [compute, cpu]
applicable_shapes: [\"VM.Standard*\"]
---
# CPU saturation

## Identify hot processes

CPU usage above threshold usually means a runaway process. Check cpu per process with top.

```sh
top -b -n1 | head -20
```

## Scale out

If cpu stays pinned after the process is handled, add capacity.
";

const DISK_RUNBOOK: &str = "---
title: Disk full
tags: [storage]
---
# Disk full

## Find large files

Disk usage grows when logs are not rotated. Check disk usage per mount.
";

fn write_runbooks(root: &std::path::Path) {
    let bucket = root.join("runbooks");
    std::fs::create_dir_all(bucket.join("storage")).unwrap();
    std::fs::write(bucket.join("cpu.md"), CPU_RUNBOOK).unwrap();
    std::fs::write(bucket.join("storage").join("disk.md"), DISK_RUNBOOK).unwrap();
    std::fs::write(bucket.join("notes.txt"), "cpu cpu cpu").unwrap();
}

fn alert() -> Alert {
    Alert::new("alarm-7", "High CPU utilization", Severity::Critical)
        .with_message("cpu above 95% for 10 minutes")
        .with_resource("ocid1.instance.abc")
        .with_label("team", "compute")
}

fn resource() -> ResourceMetadata {
    ResourceMetadata {
        resource_id: "ocid1.instance.abc".into(),
        display_name: Some("api-1".into()),
        resource_type: Some("instance".into()),
        shape: Some("VM.Standard.E4.Flex".into()),
        ..Default::default()
    }
}

#[tokio::test(flavor = "current_thread")]
async fn ingests_runbooks_and_produces_grounded_checklist() {
    let dir = tempfile::tempdir().unwrap();
    write_runbooks(dir.path());

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(KeywordEmbedder);
    let store = Arc::new(InMemoryVectorStore::new());
    let ingester = RunbookIngester::new(
        Arc::new(FsDocumentSource::new(dir.path())),
        DocumentChunker::default(),
        embedder.clone(),
        store.clone(),
    );
    let ingested = ingester.ingest_all("runbooks").await.unwrap();
    assert!(ingested >= 2);
    assert_eq!(store.count().await.unwrap(), ingested);

    // Re-ingesting unchanged documents keeps the store stable.
    assert_eq!(ingester.ingest_all("runbooks").await.unwrap(), ingested);
    assert_eq!(store.count().await.unwrap(), ingested);

    let llm = Arc::new(RecordingLlm {
        response: r#"Here is the checklist:
{"summary": "CPU pinned on api-1",
 "steps": [
   {"instruction": "Identify the hottest process", "priority": "high", "commands": ["top -b -n1"]},
   {"instruction": "Scale out the pool", "rationale": "load persists"}
 ]}"#
            .into(),
        prompts: Mutex::new(Vec::new()),
    });
    let retriever = Arc::new(
        RunbookRetriever::new(embedder, store.clone(), RetrievalConfig::default()).unwrap(),
    );
    let generator =
        Arc::new(ChecklistGenerator::new(llm.clone(), GenerationConfig::default()).unwrap());
    let enricher: Arc<dyn Enricher> = Arc::new(StaticEnricher::new().with_resource(resource()));
    let pipeline = PipelineOrchestrator::new(enricher, retriever, generator);

    let checklist = pipeline.process_alert(&alert(), 3).await.unwrap();

    assert_eq!(checklist.alert_id, "alarm-7");
    assert_eq!(checklist.summary, "CPU pinned on api-1");
    assert_eq!(checklist.provider_id, "test:llm");
    assert_eq!(checklist.severity, Severity::Critical);
    assert_eq!(checklist.source_runbooks.first().map(String::as_str), Some("cpu.md"));
    let steps: Vec<(u32, &str, Priority)> = checklist
        .steps
        .iter()
        .map(|step| (step.order, step.instruction.as_str(), step.priority))
        .collect();
    assert_eq!(
        steps,
        vec![
            (1, "Identify the hottest process", Priority::High),
            (2, "Scale out the pool", Priority::Medium),
        ]
    );
    assert_eq!(checklist.steps[0].commands, vec!["top -b -n1".to_string()]);

    let prompts = llm.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("High CPU utilization"));
    assert!(prompts[0].contains("VM.Standard.E4.Flex"));
    assert!(prompts[0].contains("cpu.md"));
    assert!(!prompts[0].contains("notes.txt"));
}

#[tokio::test(flavor = "current_thread")]
async fn empty_store_still_generates_from_alert_alone() {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(KeywordEmbedder);
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let llm = Arc::new(RecordingLlm {
        response: "1. Confirm the alarm is still firing".into(),
        prompts: Mutex::new(Vec::new()),
    });
    let pipeline = PipelineOrchestrator::new(
        Arc::new(StaticEnricher::new()),
        Arc::new(RunbookRetriever::new(embedder, store, RetrievalConfig::default()).unwrap()),
        Arc::new(ChecklistGenerator::new(llm, GenerationConfig::default()).unwrap()),
    );

    let checklist = pipeline.process_alert(&alert(), 5).await.unwrap();
    assert!(checklist.source_runbooks.is_empty());
    assert_eq!(checklist.steps.len(), 1);
    assert_eq!(checklist.steps[0].instruction, "Confirm the alarm is still firing");
    assert!(checklist.summary.starts_with("CRITICAL alert: High CPU utilization"));
}
