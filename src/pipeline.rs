//! Per-alert orchestration: enrich, retrieve, generate.

use std::sync::Arc;

use tracing::Instrument;

use crate::checklist::DynamicChecklist;
use crate::enrichment::Enricher;
use crate::error::{Error, Result};
use crate::generator::ChecklistGenerator;
use crate::model::Alert;
use crate::retriever::RunbookRetriever;

/// Runs the enrichment, retrieval and generation stages for one alert at a time.
///
/// The orchestrator holds no per-alert state, so one instance can serve
/// concurrent alerts.
pub struct PipelineOrchestrator {
    enricher: Arc<dyn Enricher>,
    retriever: Arc<RunbookRetriever>,
    generator: Arc<ChecklistGenerator>,
}

impl PipelineOrchestrator {
    /// Wires the three stages together.
    pub fn new(
        enricher: Arc<dyn Enricher>,
        retriever: Arc<RunbookRetriever>,
        generator: Arc<ChecklistGenerator>,
    ) -> Self {
        Self {
            enricher,
            retriever,
            generator,
        }
    }

    /// Produces a checklist for `alert`; the first failing stage's error is returned as-is.
    pub async fn process_alert(&self, alert: &Alert, top_k: usize) -> Result<DynamicChecklist> {
        let span = tracing::info_span!("process_alert", alert_id = %alert.id, top_k);
        async {
            let context = self.enricher.enrich(alert).await?;
            let chunks = self.retriever.retrieve(&context, top_k).await?;
            let checklist = self.generator.generate(&context, &chunks).await?;
            tracing::info!(
                steps = checklist.steps.len(),
                sources = checklist.source_runbooks.len(),
                provider = %checklist.provider_id,
                "checklist generated"
            );
            Ok::<_, Error>(checklist)
        }
        .instrument(span)
        .await
    }

    /// Retriever used by the pipeline.
    pub fn retriever(&self) -> &RunbookRetriever {
        &self.retriever
    }

    /// Generator used by the pipeline.
    pub fn generator(&self) -> &ChecklistGenerator {
        &self.generator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::StaticEnricher;
    use crate::generator::GenerationConfig;
    use crate::model::{EnrichedContext, Severity};
    use crate::retriever::RetrievalConfig;
    use crate::test_support::{chunk, ScriptedLlm, StubEmbedder};
    use crate::vector_store::{InMemoryVectorStore, VectorStore};
    use async_trait::async_trait;

    struct FailingEnricher;

    #[async_trait]
    impl Enricher for FailingEnricher {
        async fn enrich(&self, _alert: &Alert) -> Result<EnrichedContext> {
            Err(Error::Enrichment("metadata service down".into()))
        }
    }

    async fn pipeline(
        enricher: Arc<dyn Enricher>,
        embedder: Arc<StubEmbedder>,
        llm: Arc<ScriptedLlm>,
    ) -> PipelineOrchestrator {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .store_batch(vec![
                chunk("cpu#0", "runbooks/cpu.md", vec![1.0, 0.0]),
                chunk("net#0", "runbooks/net.md", vec![0.5, 0.5]),
            ])
            .await
            .unwrap();
        let retriever =
            RunbookRetriever::new(embedder, store, RetrievalConfig::default()).unwrap();
        let generator = ChecklistGenerator::new(llm, GenerationConfig::default()).unwrap();
        PipelineOrchestrator::new(enricher, Arc::new(retriever), Arc::new(generator))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn produces_checklist_from_retrieved_runbooks() {
        let llm = Arc::new(ScriptedLlm::new("Step 1: Check logs\nStep 2: Restart service"));
        let orchestrator = pipeline(
            Arc::new(StaticEnricher::new()),
            Arc::new(StubEmbedder::fixed(vec![1.0, 0.0])),
            llm.clone(),
        )
        .await;
        let alert = Alert::new("a-1", "High CPU", Severity::Critical);
        let checklist = orchestrator.process_alert(&alert, 2).await.unwrap();
        assert_eq!(checklist.steps.len(), 2);
        assert_eq!(
            checklist.source_runbooks,
            vec!["runbooks/cpu.md", "runbooks/net.md"]
        );
        assert!(llm.prompts()[0].contains("content of cpu#0"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn zero_top_k_still_generates() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0]));
        let llm = Arc::new(ScriptedLlm::new("Step 1: Page the owner"));
        let orchestrator =
            pipeline(Arc::new(StaticEnricher::new()), embedder.clone(), llm.clone()).await;
        let alert = Alert::new("a-2", "Unknown", Severity::Info);
        let checklist = orchestrator.process_alert(&alert, 0).await.unwrap();
        assert_eq!(checklist.steps.len(), 1);
        assert!(checklist.source_runbooks.is_empty());
        assert_eq!(embedder.calls(), 0);
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn enrichment_failure_stops_the_pipeline() {
        let llm = Arc::new(ScriptedLlm::new("Step 1: x"));
        let orchestrator = pipeline(
            Arc::new(FailingEnricher),
            Arc::new(StubEmbedder::default()),
            llm.clone(),
        )
        .await;
        let err = orchestrator
            .process_alert(&Alert::new("a-3", "x", Severity::Error), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Enrichment(_)));
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn retrieval_failure_propagates() {
        let llm = Arc::new(ScriptedLlm::new("Step 1: x"));
        let orchestrator = pipeline(
            Arc::new(StaticEnricher::new()),
            Arc::new(StubEmbedder::failing()),
            llm.clone(),
        )
        .await;
        let err = orchestrator
            .process_alert(&Alert::new("a-4", "x", Severity::Error), 3)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn generation_failure_propagates() {
        let orchestrator = pipeline(
            Arc::new(StaticEnricher::new()),
            Arc::new(StubEmbedder::fixed(vec![1.0, 0.0])),
            Arc::new(ScriptedLlm::failing(401)),
        )
        .await;
        let err = orchestrator
            .process_alert(&Alert::new("a-5", "x", Severity::Error), 1)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_retryable());
    }
}
