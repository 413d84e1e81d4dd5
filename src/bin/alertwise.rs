use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use alertwise::generator::build_prompt;
use alertwise::{
    init_tracing, Alert, AlertwiseConfig, ChecklistGenerator, Cli, Command, DispatchEngine,
    DocumentChunker, DynamicChecklist, EmbeddingProvider, Enricher, FsDocumentSource,
    HttpTransport, PipelineOrchestrator, ResourceMetadata, RunbookIngester, RunbookRetriever,
    StaticEnricher, VectorStore, WebhookResult,
};
use anyhow::{Context, Result};
use clap::Parser;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let config = match &cli.config {
        Some(path) => AlertwiseConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AlertwiseConfig::default(),
    };

    match cli.command.clone() {
        Command::Ingest { root, bucket, path } => {
            let embedder = cli.build_embedder()?;
            let store = cli.build_store().await?;
            let ingester = ingester(&config, root, embedder, store.clone());
            let count = match path {
                Some(path) => ingester
                    .ingest(&bucket, &path)
                    .await
                    .with_context(|| format!("failed to ingest {bucket}/{path}"))?,
                None => ingester
                    .ingest_all(&bucket)
                    .await
                    .with_context(|| format!("failed to ingest bucket {bucket}"))?,
            };
            println!(
                "Ingested {} chunk{} from {}; store now holds {}.",
                count,
                if count == 1 { "" } else { "s" },
                bucket,
                store.count().await?
            );
        }
        Command::Process {
            alert,
            resource,
            top_k,
            bucket,
            root,
            dispatch,
            dry_run,
            json,
        } => {
            let alert = read_alert(&alert)?;
            let mut enricher = StaticEnricher::new();
            if let Some(path) = resource {
                enricher = enricher.with_resource(read_resource(&path)?);
            }
            let enricher: Arc<dyn Enricher> = Arc::new(enricher);
            let embedder = cli.build_embedder()?;
            let store = cli.build_store().await?;
            if let Some(bucket) = bucket {
                let ingester = ingester(&config, root, embedder.clone(), store.clone());
                let count = ingester
                    .ingest_all(&bucket)
                    .await
                    .with_context(|| format!("failed to ingest bucket {bucket}"))?;
                tracing::info!(bucket = %bucket, chunks = count, "runbooks loaded");
            }
            let retriever = Arc::new(RunbookRetriever::new(
                embedder,
                store,
                config.retrieval.clone(),
            )?);
            let top_k = top_k.unwrap_or(config.retrieval.top_k);

            if dry_run {
                let context = enricher.enrich(&alert).await?;
                let chunks = retriever.retrieve(&context, top_k).await?;
                println!("{}", build_prompt(&context, &chunks));
                println!("dry-run enabled; skipping LLM call.");
                return Ok(());
            }

            let llm = cli.build_llm(config.generation.timeout())?;
            let generator = Arc::new(ChecklistGenerator::new(llm, config.generation.clone())?);
            let pipeline = PipelineOrchestrator::new(enricher, retriever, generator);
            let checklist = pipeline
                .process_alert(&alert, top_k)
                .await
                .with_context(|| format!("failed to process alert {}", alert.id))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&checklist)?);
            } else {
                print!("{}", render_checklist(&checklist));
            }

            if dispatch {
                let transport = Arc::new(HttpTransport::new(WEBHOOK_TIMEOUT)?);
                let engine = DispatchEngine::new(config.destinations.clone(), transport)?;
                let results = engine.dispatch(&checklist).await;
                if json {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                } else {
                    render_results(&results);
                }
            }
        }
    }
    Ok(())
}

fn ingester(
    config: &AlertwiseConfig,
    root: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
) -> RunbookIngester {
    RunbookIngester::new(
        Arc::new(FsDocumentSource::new(root)),
        DocumentChunker::new(config.chunking),
        embedder,
        store,
    )
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_alert(path: &Path) -> Result<Alert> {
    let text = read_input(path)?;
    serde_json::from_str(&text).with_context(|| format!("invalid alert JSON in {}", path.display()))
}

fn read_resource(path: &Path) -> Result<ResourceMetadata> {
    let text = read_input(path)?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid resource JSON in {}", path.display()))
}

fn render_checklist(checklist: &DynamicChecklist) -> String {
    let mut out = format!(
        "Checklist for alert {} ({})\n{}\n",
        checklist.alert_id, checklist.provider_id, checklist.summary
    );
    if checklist.steps.is_empty() {
        out.push_str("\n(no steps generated)\n");
    }
    for step in &checklist.steps {
        out.push_str(&format!(
            "\n{}. [{}] {}\n",
            step.order, step.priority, step.instruction
        ));
        if let Some(rationale) = &step.rationale {
            out.push_str(&format!("   why: {rationale}\n"));
        }
        if let (Some(current), Some(expected)) = (&step.current_value, &step.expected_value) {
            out.push_str(&format!("   current: {current}, expected: {expected}\n"));
        }
        for command in &step.commands {
            out.push_str(&format!("   $ {command}\n"));
        }
    }
    if !checklist.source_runbooks.is_empty() {
        out.push_str(&format!("\nSources: {}\n", checklist.source_runbooks.join(", ")));
    }
    out
}

fn render_results(results: &[WebhookResult]) {
    if results.is_empty() {
        println!("No destinations matched this checklist.");
    }
    for result in results {
        let attempts = if result.attempts == 1 { "attempt" } else { "attempts" };
        match (result.success, result.status_code) {
            (true, Some(status)) => println!(
                "{}: delivered (HTTP {status}, {} {attempts})",
                result.destination_name, result.attempts
            ),
            _ => println!(
                "{}: failed after {} {attempts}: {}",
                result.destination_name,
                result.attempts,
                result.error_message.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
