//! Alert and enrichment records consumed by the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Alert severity as reported by the monitoring source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Service-impacting outage.
    Critical,
    /// Failure that needs attention soon.
    Error,
    /// Degradation or threshold breach.
    #[default]
    Warning,
    /// Informational notice.
    Info,
}

impl Severity {
    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Self::Critical),
            "ERROR" | "MAJOR" => Ok(Self::Error),
            "WARNING" | "WARN" | "MINOR" => Ok(Self::Warning),
            "INFO" | "INFORMATIONAL" => Ok(Self::Info),
            other => Err(Error::validation(format!("unknown severity '{other}'"))),
        }
    }
}

/// Normalized alert handed to the pipeline by the alarm-parsing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Stable alert identifier.
    pub id: String,
    /// Short alert title.
    pub title: String,
    /// Alert body text.
    #[serde(default)]
    pub message: String,
    /// Alert severity.
    #[serde(default)]
    pub severity: Severity,
    /// Identifier of the affected resource, when known.
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Free-form labels (dimensions) attached by the alarm source.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// When the alarm fired.
    #[serde(default = "Utc::now")]
    pub fired_at: DateTime<Utc>,
}

impl Alert {
    /// Builds an alert with the required fields and defaults for the rest.
    pub fn new(id: impl Into<String>, title: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: String::new(),
            severity,
            resource_id: None,
            labels: BTreeMap::new(),
            fired_at: Utc::now(),
        }
    }

    /// Sets the alert body.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the affected resource identifier.
    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Adds a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Compute/host metadata resolved for the alert's resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Provider resource identifier.
    pub resource_id: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Resource kind (e.g. `instance`, `database`).
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Host shape string matched against runbook shape patterns.
    #[serde(default)]
    pub shape: Option<String>,
    /// Region or zone.
    #[serde(default)]
    pub region: Option<String>,
    /// Provider-side tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Point-in-time metric reading captured during enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    /// Metric name.
    pub name: String,
    /// Observed value.
    pub value: f64,
    /// Unit label.
    #[serde(default)]
    pub unit: Option<String>,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
}

/// Log line captured during enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Level string as reported by the log source.
    #[serde(default)]
    pub level: Option<String>,
    /// Log message.
    pub message: String,
}

/// Alert plus everything the enrichment collaborator could gather about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedContext {
    /// Originating alert.
    pub alert: Alert,
    /// Resource metadata, when the resource could be resolved.
    #[serde(default)]
    pub resource: Option<ResourceMetadata>,
    /// Recent metric readings.
    #[serde(default)]
    pub metrics: Vec<MetricSnapshot>,
    /// Recent log entries, oldest first.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Additional collaborator-specific properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl EnrichedContext {
    /// Context carrying only the alert.
    pub fn from_alert(alert: Alert) -> Self {
        Self {
            alert,
            resource: None,
            metrics: Vec::new(),
            logs: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Attaches resource metadata.
    pub fn with_resource(mut self, resource: ResourceMetadata) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Host shape of the affected resource, if known.
    pub fn shape(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .and_then(|resource| resource.shape.as_deref())
            .filter(|shape| !shape.trim().is_empty())
    }
}
