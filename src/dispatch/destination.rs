use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::checklist::DynamicChecklist;
use crate::error::{Error, Result};
use crate::model::Severity;

const PAGERDUTY_SUMMARY_LIMIT: usize = 1024;

/// Payload format a destination expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    /// Slack incoming webhook (`{"text": ...}`).
    Slack,
    /// PagerDuty Events API v2.
    #[serde(alias = "pager_duty")]
    PagerDuty,
    /// The checklist JSON as-is.
    #[default]
    Generic,
}

/// Which checklists a destination receives. Empty sets match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationFilter {
    /// Accepted alert severities.
    pub severities: BTreeSet<Severity>,
    /// Labels that must be present with exactly these values.
    pub labels: BTreeMap<String, String>,
}

impl DestinationFilter {
    /// True when a checklist with `severity` and `labels` passes.
    pub fn matches(&self, severity: Severity, labels: &BTreeMap<String, String>) -> bool {
        let severity_ok = self.severities.is_empty() || self.severities.contains(&severity);
        severity_ok
            && self
                .labels
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
    }
}

fn default_enabled() -> bool {
    true
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// One configured delivery target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDestination {
    /// Unique destination name.
    pub name: String,
    /// Payload format.
    #[serde(rename = "type", default)]
    pub kind: DestinationType,
    /// Endpoint URL (http or https).
    pub url: String,
    /// Disabled destinations are skipped without a result.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Severity/label filter.
    #[serde(default)]
    pub filter: DestinationFilter,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Additional attempts after the first failure.
    #[serde(default = "default_retry_count", alias = "retryCount")]
    pub retry_count: u32,
    /// Fixed wait between attempts.
    #[serde(default = "default_retry_delay_ms", alias = "retryDelay", alias = "retryDelayMs")]
    pub retry_delay_ms: u64,
    /// PagerDuty integration key.
    #[serde(default, alias = "routingKey")]
    pub routing_key: Option<String>,
}

impl WebhookDestination {
    /// Enabled destination with default filter and retry policy.
    pub fn new(name: impl Into<String>, kind: DestinationType, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            url: url.into(),
            enabled: true,
            filter: DestinationFilter::default(),
            headers: BTreeMap::new(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            routing_key: None,
        }
    }

    /// Wait between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Checks name, URL, headers and type-specific settings.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("destination name must not be empty"));
        }
        let url = Url::parse(&self.url).map_err(|err| {
            Error::validation(format!(
                "destination {} has invalid url {}: {err}",
                self.name, self.url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::validation(format!(
                "destination {} url must use http or https",
                self.name
            )));
        }
        for (key, value) in &self.headers {
            HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                Error::validation(format!("destination {} has invalid header name {key}", self.name))
            })?;
            HeaderValue::from_str(value).map_err(|_| {
                Error::validation(format!(
                    "destination {} has invalid value for header {key}",
                    self.name
                ))
            })?;
        }
        if self.kind == DestinationType::PagerDuty
            && self
                .routing_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(Error::validation(format!(
                "pagerduty destination {} requires a routing_key",
                self.name
            )));
        }
        Ok(())
    }

    /// True when this destination should receive `checklist`.
    pub fn accepts(&self, checklist: &DynamicChecklist) -> bool {
        self.enabled && self.filter.matches(checklist.severity, &checklist.labels)
    }

    /// Request body in this destination's format.
    pub fn payload(&self, checklist: &DynamicChecklist) -> Result<Value> {
        match self.kind {
            DestinationType::Generic => Ok(serde_json::to_value(checklist)?),
            DestinationType::Slack => Ok(json!({ "text": slack_text(checklist) })),
            DestinationType::PagerDuty => {
                let routing_key = self.routing_key.as_deref().unwrap_or_default();
                Ok(json!({
                    "routing_key": routing_key,
                    "event_action": "trigger",
                    "dedup_key": checklist.alert_id,
                    "payload": {
                        "summary": truncate_chars(&checklist.summary, PAGERDUTY_SUMMARY_LIMIT),
                        "source": "alertwise",
                        "severity": pagerduty_severity(checklist.severity),
                        "timestamp": checklist.generated_at.to_rfc3339(),
                        "custom_details": serde_json::to_value(checklist)?,
                    }
                }))
            }
        }
    }
}

fn pagerduty_severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "info",
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn slack_text(checklist: &DynamicChecklist) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "*[{}] Troubleshooting checklist for alert {}*",
        checklist.severity, checklist.alert_id
    );
    let _ = writeln!(out, "{}", checklist.summary);
    if checklist.steps.is_empty() {
        let _ = writeln!(out, "\n_No checklist steps were generated._");
    }
    for step in &checklist.steps {
        let _ = writeln!(out, "\n{}. *{}* ({})", step.order, step.instruction, step.priority);
        if let Some(rationale) = &step.rationale {
            let _ = writeln!(out, "   _{rationale}_");
        }
        for command in &step.commands {
            let _ = writeln!(out, "   `{command}`");
        }
    }
    if !checklist.source_runbooks.is_empty() {
        let _ = writeln!(out, "\nSources: {}", checklist.source_runbooks.join(", "));
    }
    out.trim_end().to_string()
}
