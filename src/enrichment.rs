//! Enrichment collaborator seam: alert in, context out.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Alert, EnrichedContext, LogEntry, MetricSnapshot, ResourceMetadata};

/// Gathers resource metadata, metrics and logs for an alert.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Builds the context the retriever and generator work from.
    async fn enrich(&self, alert: &Alert) -> Result<EnrichedContext>;
}

/// Enricher serving pre-loaded resource metadata keyed by resource id.
///
/// Alerts whose resource is unknown get a context carrying only the alert.
#[derive(Debug, Clone, Default)]
pub struct StaticEnricher {
    resources: BTreeMap<String, ResourceMetadata>,
    metrics: Vec<MetricSnapshot>,
    logs: Vec<LogEntry>,
}

impl StaticEnricher {
    /// Empty enricher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers metadata for `resource.resource_id`.
    pub fn with_resource(mut self, resource: ResourceMetadata) -> Self {
        self.resources.insert(resource.resource_id.clone(), resource);
        self
    }

    /// Metric readings attached to every context.
    pub fn with_metrics(mut self, metrics: Vec<MetricSnapshot>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Log entries attached to every context.
    pub fn with_logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = logs;
        self
    }
}

#[async_trait]
impl Enricher for StaticEnricher {
    async fn enrich(&self, alert: &Alert) -> Result<EnrichedContext> {
        let mut context = EnrichedContext::from_alert(alert.clone());
        context.resource = alert
            .resource_id
            .as_deref()
            .and_then(|id| self.resources.get(id))
            .cloned();
        context.metrics = self.metrics.clone();
        context.logs = self.logs.clone();
        if context.resource.is_none() {
            if let Some(id) = &alert.resource_id {
                tracing::debug!(resource_id = %id, "no metadata for alert resource");
            }
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    #[tokio::test(flavor = "current_thread")]
    async fn resolves_known_resources() {
        let enricher = StaticEnricher::new().with_resource(ResourceMetadata {
            resource_id: "i-1".into(),
            shape: Some("VM.Standard3.Flex".into()),
            ..ResourceMetadata::default()
        });
        let alert = Alert::new("a", "CPU", Severity::Error).with_resource("i-1");
        let context = enricher.enrich(&alert).await.unwrap();
        assert_eq!(context.shape(), Some("VM.Standard3.Flex"));

        let unknown = Alert::new("b", "CPU", Severity::Error).with_resource("i-2");
        assert!(enricher.enrich(&unknown).await.unwrap().resource.is_none());
    }
}
