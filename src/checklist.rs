//! Checklist records emitted by generation and consumed by dispatch.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Severity;

/// Urgency attached to a checklist step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Nice to check.
    Low,
    /// Default urgency.
    #[default]
    Medium,
    /// Check first.
    High,
}

impl Priority {
    /// Lenient parse used for model output; unknown values yield `None`.
    pub fn parse_loose(value: &str) -> Option<Self> {
        let lowered = value.trim().trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        match lowered.as_str() {
            "low" | "minor" => Some(Self::Low),
            "medium" | "med" | "normal" | "moderate" => Some(Self::Medium),
            "high" | "critical" | "urgent" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.write_str(label)
    }
}

/// One remediation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistStep {
    /// 1-based position within the checklist.
    pub order: u32,
    /// What to do (never blank).
    pub instruction: String,
    /// Why the step matters.
    pub rationale: Option<String>,
    /// Observed value relevant to the step, when known.
    pub current_value: Option<String>,
    /// Value a healthy system would show.
    pub expected_value: Option<String>,
    /// Step urgency.
    pub priority: Priority,
    /// Shell commands to run, in order.
    pub commands: Vec<String>,
}

impl ChecklistStep {
    /// Step with only an instruction.
    pub fn new(order: u32, instruction: impl Into<String>) -> Self {
        Self {
            order,
            instruction: instruction.into(),
            rationale: None,
            current_value: None,
            expected_value: None,
            priority: Priority::default(),
            commands: Vec::new(),
        }
    }
}

/// Ranked troubleshooting checklist generated for one alert.
///
/// Serializes to the downstream contract
/// `{alertId, summary, steps, sourceRunbooks, generatedAt, llmProviderUsed}`.
/// Severity and labels of the originating alert ride along for dispatch
/// filtering but are not part of the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicChecklist {
    /// Originating alert id.
    pub alert_id: String,
    /// One-paragraph summary.
    pub summary: String,
    /// Steps numbered from 1 without gaps.
    pub steps: Vec<ChecklistStep>,
    /// Distinct runbook paths used as context, first-seen order.
    pub source_runbooks: Vec<String>,
    /// Generation time (RFC 3339).
    pub generated_at: DateTime<Utc>,
    /// Identifier of the generation backend.
    #[serde(rename = "llmProviderUsed")]
    pub provider_id: String,
    /// Severity of the originating alert.
    #[serde(skip)]
    pub severity: Severity,
    /// Labels of the originating alert.
    #[serde(skip)]
    pub labels: BTreeMap<String, String>,
}

impl DynamicChecklist {
    /// True when generation produced no usable steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Renumbers steps from 1 in their current order.
    pub fn renumber(&mut self) {
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.order = idx as u32 + 1;
        }
    }
}
