//! Checklist fan-out to webhook destinations with filtering and bounded retry.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checklist::DynamicChecklist;
use crate::error::{Error, Result};

mod destination;
mod transport;

pub use destination::{DestinationFilter, DestinationType, WebhookDestination};
pub use transport::{HttpTransport, TransportResponse, WebhookTransport};

/// Outcome of delivering one checklist to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResult {
    /// Destination name.
    pub destination_name: String,
    /// Whether a 2xx response was received.
    pub success: bool,
    /// Last HTTP status seen, if any response arrived.
    pub status_code: Option<u16>,
    /// Last error; present exactly when `success` is false.
    pub error_message: Option<String>,
    /// Completion time of the final attempt.
    pub sent_at: DateTime<Utc>,
    /// Requests made, including the first.
    pub attempts: u32,
}

impl WebhookResult {
    fn succeeded(destination: &str, status: u16, attempts: u32) -> Self {
        Self {
            destination_name: destination.to_string(),
            success: true,
            status_code: Some(status),
            error_message: None,
            sent_at: Utc::now(),
            attempts,
        }
    }

    fn failed(destination: &str, status: Option<u16>, error: String, attempts: u32) -> Self {
        Self {
            destination_name: destination.to_string(),
            success: false,
            status_code: status,
            error_message: Some(error),
            sent_at: Utc::now(),
            attempts,
        }
    }
}

/// Delivers checklists to every matching destination concurrently.
pub struct DispatchEngine {
    destinations: Vec<WebhookDestination>,
    transport: Arc<dyn WebhookTransport>,
}

impl DispatchEngine {
    /// Validates `destinations` (names must be unique) and builds the engine.
    pub fn new(
        destinations: Vec<WebhookDestination>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Result<Self> {
        let mut names = HashSet::new();
        for destination in &destinations {
            destination.validate()?;
            if !names.insert(destination.name.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate destination name {}",
                    destination.name
                )));
            }
        }
        Ok(Self {
            destinations,
            transport,
        })
    }

    /// Configured destinations in order.
    pub fn destinations(&self) -> &[WebhookDestination] {
        &self.destinations
    }

    /// Sends `checklist` to every enabled destination whose filter matches and
    /// waits for all of them. Results follow destination order; filtered-out
    /// destinations produce no entry. Failures are reported, never returned as `Err`.
    pub async fn dispatch(&self, checklist: &DynamicChecklist) -> Vec<WebhookResult> {
        let deliveries = self
            .destinations
            .iter()
            .filter(|destination| destination.accepts(checklist))
            .map(|destination| self.deliver(destination, checklist));
        let results = join_all(deliveries).await;
        let delivered = results.iter().filter(|result| result.success).count();
        tracing::info!(
            alert_id = %checklist.alert_id,
            destinations = results.len(),
            delivered,
            "dispatch finished"
        );
        results
    }

    /// Runs [`dispatch`](Self::dispatch) to completion on a private runtime.
    ///
    /// Must not be called from inside a tokio runtime.
    pub fn dispatch_blocking(&self, checklist: &DynamicChecklist) -> Result<Vec<WebhookResult>> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::validation(
                "dispatch_blocking cannot run inside an async runtime; use dispatch",
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.dispatch(checklist)))
    }

    async fn deliver(
        &self,
        destination: &WebhookDestination,
        checklist: &DynamicChecklist,
    ) -> WebhookResult {
        let name = destination.name.as_str();
        let body = match destination.payload(checklist) {
            Ok(body) => body,
            Err(err) => return WebhookResult::failed(name, None, err.to_string(), 0),
        };
        let result = self.deliver_with_retry(destination, &body).await;
        if result.success {
            tracing::info!(
                destination = name,
                status = ?result.status_code,
                attempts = result.attempts,
                "checklist delivered"
            );
        } else {
            tracing::warn!(
                destination = name,
                status = ?result.status_code,
                attempts = result.attempts,
                error = result.error_message.as_deref().unwrap_or_default(),
                "checklist delivery failed"
            );
        }
        result
    }

    async fn deliver_with_retry(
        &self,
        destination: &WebhookDestination,
        body: &Value,
    ) -> WebhookResult {
        let name = destination.name.as_str();
        let max_attempts = destination.retry_count.saturating_add(1);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let outcome = self
                .transport
                .post(&destination.url, &destination.headers, body)
                .await;
            let (status, error, retryable) = match outcome {
                Ok(resp) if resp.is_success() => {
                    return WebhookResult::succeeded(name, resp.status, attempts);
                }
                Ok(resp) => {
                    let err = Error::from_status(name, resp.status, resp.body);
                    (Some(resp.status), err.to_string(), resp.status >= 500)
                }
                Err(err) => {
                    let retryable = err.is_retryable() && err.status().is_none();
                    (None, err.to_string(), retryable)
                }
            };
            if !retryable || attempts >= max_attempts {
                return WebhookResult::failed(name, status, error, attempts);
            }
            tracing::warn!(
                destination = name,
                attempt = attempts,
                status = ?status,
                delay_ms = destination.retry_delay_ms,
                "webhook attempt failed; retrying"
            );
            tokio::time::sleep(destination.retry_delay()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::ChecklistStep;
    use crate::model::Severity;
    use crate::test_support::{Scripted, ScriptedTransport};
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;

    fn checklist(severity: Severity) -> DynamicChecklist {
        DynamicChecklist {
            alert_id: "a-1".into(),
            summary: "Disk full".into(),
            steps: vec![ChecklistStep::new(1, "Free space")],
            source_runbooks: vec!["disk.md".into()],
            generated_at: Utc::now(),
            provider_id: "stub:llm".into(),
            severity,
            labels: BTreeMap::new(),
        }
    }

    fn destination(name: &str, url: &str) -> WebhookDestination {
        WebhookDestination::new(name, DestinationType::Generic, url)
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn retries_server_errors_until_success() {
        let url = "http://hooks.test/flaky";
        let transport = Arc::new(ScriptedTransport::default().script(
            url,
            &[Scripted::Status(500), Scripted::Status(500), Scripted::Status(200)],
        ));
        let engine = DispatchEngine::new(vec![destination("flaky", url)], transport.clone()).unwrap();
        let started = tokio::time::Instant::now();
        let results = engine.dispatch(&checklist(Severity::Critical)).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].status_code, Some(200));
        assert_eq!(results[0].attempts, 3);
        assert!(results[0].error_message.is_none());
        assert_eq!(transport.attempts(url), 3);
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn client_errors_are_not_retried() {
        let url = "http://hooks.test/bad";
        let transport =
            Arc::new(ScriptedTransport::default().script(url, &[Scripted::Status(400)]));
        let engine = DispatchEngine::new(vec![destination("bad", url)], transport.clone()).unwrap();
        let results = engine.dispatch(&checklist(Severity::Critical)).await;
        assert!(!results[0].success);
        assert_eq!(results[0].status_code, Some(400));
        assert_eq!(results[0].attempts, 1);
        assert!(results[0].error_message.is_some());
        assert_eq!(transport.attempts(url), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn exhausted_retries_report_last_error() {
        let url = "http://hooks.test/down";
        let transport = Arc::new(
            ScriptedTransport::default().script(url, &[Scripted::ConnectionRefused]),
        );
        let mut dest = destination("down", url);
        dest.retry_count = 2;
        let engine = DispatchEngine::new(vec![dest], transport.clone()).unwrap();
        let results = engine.dispatch(&checklist(Severity::Critical)).await;
        assert!(!results[0].success);
        assert_eq!(results[0].status_code, None);
        assert_eq!(results[0].attempts, 3);
        assert!(results[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn filtered_destinations_produce_no_result() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut critical_only = destination("pager", "http://hooks.test/pager");
        critical_only.filter.severities = BTreeSet::from([Severity::Critical]);
        let mut disabled = destination("off", "http://hooks.test/off");
        disabled.enabled = false;
        let engine = DispatchEngine::new(
            vec![critical_only, disabled, destination("all", "http://hooks.test/all")],
            transport.clone(),
        )
        .unwrap();
        let results = engine.dispatch(&checklist(Severity::Warning)).await;
        let names: Vec<&str> = results.iter().map(|r| r.destination_name.as_str()).collect();
        assert_eq!(names, vec!["all"]);
        assert_eq!(transport.attempts("http://hooks.test/pager"), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn one_failure_does_not_block_others() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .script("http://hooks.test/a", &[Scripted::Status(503)])
                .script("http://hooks.test/b", &[Scripted::Status(204)]),
        );
        let engine = DispatchEngine::new(
            vec![
                destination("a", "http://hooks.test/a"),
                destination("b", "http://hooks.test/b"),
            ],
            transport.clone(),
        )
        .unwrap();
        let results = engine.dispatch(&checklist(Severity::Error)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].destination_name, "a");
        assert!(!results[0].success);
        assert_eq!(results[0].attempts, 4);
        assert!(results[1].success);
        assert_eq!(transport.bodies().iter().filter(|(u, _)| u.ends_with("/b")).count(), 1);
    }

    #[test]
    fn rejects_duplicate_names() {
        let transport = Arc::new(ScriptedTransport::default());
        let err = DispatchEngine::new(
            vec![destination("x", "http://a"), destination("x", "http://b")],
            transport,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn blocking_dispatch_outside_runtime() {
        let transport = Arc::new(ScriptedTransport::default());
        let engine =
            DispatchEngine::new(vec![destination("x", "http://hooks.test/x")], transport).unwrap();
        let results = engine.dispatch_blocking(&checklist(Severity::Info)).unwrap();
        assert!(results[0].success);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_dispatch_inside_runtime_is_rejected() {
        let engine = DispatchEngine::new(Vec::new(), Arc::new(ScriptedTransport::default())).unwrap();
        assert!(engine.dispatch_blocking(&checklist(Severity::Info)).is_err());
    }
}
