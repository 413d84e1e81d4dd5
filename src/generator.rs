//! Prompt assembly, LLM invocation and checklist parsing.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checklist::{ChecklistStep, DynamicChecklist, Priority};
use crate::embeddings::RetrievedChunk;
use crate::error::{Error, Result};
use crate::llm::{LlmProvider, ProviderRequest};
use crate::model::EnrichedContext;

const MAX_PROMPT_LOGS: usize = 20;

const SYSTEM_PROMPT: &str = "You are an on-call site reliability engineer. \
Produce concise, actionable troubleshooting checklists grounded in the supplied runbook excerpts.";

const INSTRUCTIONS: &str = "Write a numbered troubleshooting checklist for this alert.
- Start with a line `Summary: <one sentence>`.
- Number every step as `Step N: <instruction>`, most important first.
- Under a step you may add `Rationale:`, `Current:`, `Expected:`, `Priority: HIGH|MEDIUM|LOW` and `Command:` lines.
- Cite the runbook excerpt each step relies on as [source path].
- Only suggest commands that apply to the resource's host shape and platform.";

/// Sampling and deadline settings for checklist generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token limit.
    pub max_tokens: usize,
    /// Deadline for one provider call.
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
            timeout_seconds: 30,
        }
    }
}

impl GenerationConfig {
    /// Rejects settings providers would refuse.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::validation(
                "generation.temperature must be within [0, 2]",
            ));
        }
        if self.max_tokens == 0 {
            return Err(Error::validation("generation.max_tokens must be positive"));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::validation(
                "generation.timeout_seconds must be positive",
            ));
        }
        Ok(())
    }

    /// Provider call deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Turns an enriched alert plus retrieved runbook chunks into a checklist.
pub struct ChecklistGenerator {
    llm: Arc<dyn LlmProvider>,
    config: GenerationConfig,
}

impl ChecklistGenerator {
    /// Builds a generator over `llm`.
    pub fn new(llm: Arc<dyn LlmProvider>, config: GenerationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { llm, config })
    }

    /// Identifier of the backing provider.
    pub fn provider_id(&self) -> &str {
        self.llm.provider_id()
    }

    /// Generates a checklist. Provider failures and timeouts propagate; an
    /// unparsable response yields an empty step list.
    pub async fn generate(
        &self,
        context: &EnrichedContext,
        chunks: &[RetrievedChunk],
    ) -> Result<DynamicChecklist> {
        let prompt = build_prompt(context, chunks);
        tracing::debug!(
            alert_id = %context.alert.id,
            prompt_chars = prompt.len(),
            chunks = chunks.len(),
            "requesting checklist"
        );
        let request = ProviderRequest {
            system: SYSTEM_PROMPT,
            prompt: &prompt,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let after = self.config.timeout();
        let response = tokio::time::timeout(after, self.llm.generate(&request))
            .await
            .map_err(|_| Error::Timeout {
                operation: "checklist generation",
                after,
            })??;

        let parsed = parse_checklist_response(&response);
        if parsed.steps.is_empty() {
            tracing::warn!(
                alert_id = %context.alert.id,
                response_chars = response.len(),
                "no checklist steps recognised in model response"
            );
        }
        let alert = &context.alert;
        let mut checklist = DynamicChecklist {
            alert_id: alert.id.clone(),
            summary: parsed.summary.unwrap_or_else(|| default_summary(context)),
            steps: parsed.steps,
            source_runbooks: source_runbooks(chunks),
            generated_at: Utc::now(),
            provider_id: self.llm.provider_id().to_string(),
            severity: alert.severity,
            labels: alert.labels.clone(),
        };
        checklist.renumber();
        Ok(checklist)
    }
}

fn default_summary(context: &EnrichedContext) -> String {
    let alert = &context.alert;
    let message = alert.message.trim();
    if message.is_empty() {
        format!("{} alert: {}", alert.severity, alert.title.trim())
    } else {
        format!("{} alert: {} ({message})", alert.severity, alert.title.trim())
    }
}

/// Distinct chunk source paths in first-seen order.
pub fn source_runbooks(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|retrieved| seen.insert(retrieved.chunk.source_path.as_str()))
        .map(|retrieved| retrieved.chunk.source_path.clone())
        .collect()
}

/// Renders the user prompt sent to the model.
pub fn build_prompt(context: &EnrichedContext, chunks: &[RetrievedChunk]) -> String {
    let alert = &context.alert;
    let mut out = String::new();
    let _ = writeln!(out, "## Alert");
    let _ = writeln!(out, "ID: {}", alert.id);
    let _ = writeln!(out, "Title: {}", alert.title);
    let _ = writeln!(out, "Severity: {}", alert.severity);
    if !alert.message.trim().is_empty() {
        let _ = writeln!(out, "Message: {}", alert.message.trim());
    }
    let _ = writeln!(out, "Fired at: {}", alert.fired_at.to_rfc3339());
    if let Some(resource_id) = &alert.resource_id {
        let _ = writeln!(out, "Resource: {resource_id}");
    }
    if !alert.labels.is_empty() {
        let labels: Vec<String> = alert
            .labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        let _ = writeln!(out, "Labels: {}", labels.join(", "));
    }

    if let Some(resource) = &context.resource {
        let _ = writeln!(out, "\n## Resource");
        let _ = writeln!(out, "ID: {}", resource.resource_id);
        let fields = [
            ("Name", &resource.display_name),
            ("Type", &resource.resource_type),
            ("Shape", &resource.shape),
            ("Region", &resource.region),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                let _ = writeln!(out, "{label}: {value}");
            }
        }
        for (key, value) in &resource.tags {
            let _ = writeln!(out, "Tag {key}: {value}");
        }
    }

    if !context.metrics.is_empty() {
        let _ = writeln!(out, "\n## Recent metrics");
        for metric in &context.metrics {
            let unit = metric.unit.as_deref().unwrap_or("");
            let _ = writeln!(
                out,
                "- {}: {}{}{} at {}",
                metric.name,
                metric.value,
                if unit.is_empty() { "" } else { " " },
                unit,
                metric.timestamp.to_rfc3339()
            );
        }
    }

    if !context.logs.is_empty() {
        let skip = context.logs.len().saturating_sub(MAX_PROMPT_LOGS);
        let _ = writeln!(out, "\n## Recent logs");
        for entry in context.logs.iter().skip(skip) {
            let level = entry.level.as_deref().unwrap_or("LOG");
            let _ = writeln!(
                out,
                "- {} [{}] {}",
                entry.timestamp.to_rfc3339(),
                level,
                entry.message.trim()
            );
        }
    }

    let _ = writeln!(out, "\n## Runbook excerpts");
    if chunks.is_empty() {
        let _ = writeln!(
            out,
            "No runbook excerpts matched; rely on general operational practice."
        );
    }
    for (idx, retrieved) in chunks.iter().enumerate() {
        let chunk = &retrieved.chunk;
        let _ = writeln!(
            out,
            "\n### [{}] {} | {}",
            idx + 1,
            chunk.source_path,
            chunk.section_title
        );
        let _ = writeln!(out, "{}", chunk.content.trim());
    }

    let _ = writeln!(out, "\n## Instructions\n{INSTRUCTIONS}");
    out
}

/// Steps and optional summary recovered from a model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedChecklist {
    /// `Summary:` line or JSON `summary`, when present.
    pub summary: Option<String>,
    /// Recognised steps, numbered from 1.
    pub steps: Vec<ChecklistStep>,
}

/// Parses a model response: a JSON `{summary, steps}` object first, then
/// numbered step markers. Never fails; unrecognised input yields no steps.
pub fn parse_checklist_response(response: &str) -> ParsedChecklist {
    let response = response.trim();
    if response.is_empty() {
        return ParsedChecklist::default();
    }
    let mut parsed = parse_json(response).unwrap_or_else(|| parse_text(response));
    for (idx, step) in parsed.steps.iter_mut().enumerate() {
        step.order = idx as u32 + 1;
    }
    parsed
}

#[derive(Deserialize)]
struct JsonChecklist {
    #[serde(default)]
    summary: Option<String>,
    steps: Vec<JsonStep>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonStep {
    #[serde(default, alias = "action", alias = "step", alias = "title")]
    instruction: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default, alias = "current", alias = "current_value")]
    current_value: Option<Value>,
    #[serde(default, alias = "expected", alias = "expected_value")]
    expected_value: Option<Value>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default, alias = "command")]
    commands: Option<Value>,
}

fn parse_json(response: &str) -> Option<ParsedChecklist> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    let parsed: JsonChecklist = serde_json::from_str(&response[start..=end]).ok()?;
    let steps = parsed
        .steps
        .into_iter()
        .filter_map(|step| {
            let instruction = clean_text(step.instruction.as_deref()?);
            if instruction.is_empty() {
                return None;
            }
            let mut out = ChecklistStep::new(0, instruction);
            out.rationale = non_blank(step.rationale.as_deref());
            out.current_value = step.current_value.as_ref().and_then(value_text);
            out.expected_value = step.expected_value.as_ref().and_then(value_text);
            out.priority = step
                .priority
                .as_deref()
                .and_then(Priority::parse_loose)
                .unwrap_or_default();
            out.commands = match step.commands {
                Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
                Some(other) => value_text(&other).into_iter().collect(),
                None => Vec::new(),
            };
            Some(out)
        })
        .collect();
    Some(ParsedChecklist {
        summary: non_blank(parsed.summary.as_deref()),
        steps,
    })
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => non_blank(Some(text.as_str())),
        other => Some(other.to_string()),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(clean_text)
        .filter(|text| !text.is_empty())
}

fn clean_text(text: &str) -> String {
    text.trim()
        .trim_start_matches("**")
        .trim_end_matches("**")
        .trim()
        .to_string()
}

fn keyword_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:[-*+]\s+)?(?:#+\s*)?(?:\*\*)?\s*step\s+(\d{1,3})\s*(?:[:.)]|\s-)\s*(?:\*\*)?\s*(.*)$",
        )
        .expect("valid step marker pattern")
    })
}

fn numbered_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[-*+]\s+)?(?:#+\s*)?(?:\*\*)?(\d{1,3})[.)](?:\*\*)?(?:\s+(.*))?$")
            .expect("valid numbered marker pattern")
    })
}

/// Instruction text of a step marker line. Bare `N.`/`N)` markers only count
/// when `N` continues the sequence.
fn step_start(line: &str, last: Option<u32>) -> Option<(u32, String)> {
    if let Some(found) = keyword_marker().captures(line).and_then(marker_parts) {
        return Some(found);
    }
    let (number, text) = numbered_marker().captures(line).and_then(marker_parts)?;
    let expected = last.map_or(1, |last| last + 1);
    (number == expected).then_some((number, text))
}

fn marker_parts(caps: Captures<'_>) -> Option<(u32, String)> {
    let number = caps[1].parse().ok()?;
    let text = caps.get(2).map_or("", |m| m.as_str());
    Some((number, clean_text(text)))
}

fn field_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:[-*+]\s+)?(?:\*\*)?(summary|rationale|why|current(?:\s+value)?|expected(?:\s+value)?|priority|commands?)(?:\*\*)?\s*:\s*(?:\*\*)?\s*(.*)$",
        )
        .expect("valid field pattern")
    })
}

fn parse_text(response: &str) -> ParsedChecklist {
    let mut parsed = ParsedChecklist::default();
    let mut current: Option<ChecklistStep> = None;
    let mut last_number: Option<u32> = None;
    let mut in_fence = false;

    for raw in response.lines() {
        let line = raw.trim();
        if line.starts_with("```") || line.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            if let Some(step) = current.as_mut() {
                if !line.is_empty() {
                    step.commands.push(line.to_string());
                }
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = field_line().captures(line) {
            let field = caps[1].to_lowercase();
            let value = clean_text(&caps[2]);
            if field == "summary" {
                if parsed.summary.is_none() && !value.is_empty() {
                    parsed.summary = Some(value);
                }
                continue;
            }
            if let Some(step) = current.as_mut() {
                apply_field(step, &field, value);
                continue;
            }
        }
        if let Some((number, instruction)) = step_start(line, last_number) {
            if let Some(done) = current.take() {
                parsed.steps.push(done);
            }
            last_number = Some(number);
            current = Some(ChecklistStep::new(0, instruction));
            continue;
        }
        let Some(step) = current.as_mut() else {
            continue;
        };
        if let Some(command) = line.strip_prefix("$ ") {
            push_command(step, command);
        } else if step.instruction.is_empty() {
            step.instruction = clean_text(line);
        }
    }
    if let Some(done) = current {
        parsed.steps.push(done);
    }
    parsed.steps.retain(|step| !step.instruction.is_empty());
    parsed
}

fn apply_field(step: &mut ChecklistStep, field: &str, value: String) {
    let slot = match field {
        "rationale" | "why" => &mut step.rationale,
        "priority" => {
            if let Some(priority) = Priority::parse_loose(&value) {
                step.priority = priority;
            }
            return;
        }
        "command" | "commands" => {
            push_command(step, &value);
            return;
        }
        f if f.starts_with("current") => &mut step.current_value,
        _ => &mut step.expected_value,
    };
    if !value.is_empty() {
        *slot = Some(value);
    }
}

fn push_command(step: &mut ChecklistStep, raw: &str) {
    let command = raw.trim().trim_matches('`').trim();
    let command = command.strip_prefix("$ ").unwrap_or(command).trim();
    if !command.is_empty() {
        step.commands.push(command.to_string());
    }
}
