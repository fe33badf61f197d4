//! Typed views over the agent's structured output.
//!
//! Parsing is lenient: every field is optional. A payload that is not an
//! object, or carries none of the expected keys, is shown as raw JSON.

use serde::Deserialize;
use serde_json::Value;

use crate::core::workflow::SessionKind;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlanStep {
    pub step: Option<Value>,
    pub description: Option<String>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScopePlan {
    pub summary: Option<String>,
    pub confidence_score: Option<f64>,
    pub confidence_reasoning: Option<String>,
    pub complexity: Option<String>,
    pub action_plan: Vec<PlanStep>,
    pub risks: Vec<String>,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutionProgress {
    pub current_task: Option<String>,
    pub progress_percentage: Option<f64>,
    pub completed_steps: Vec<String>,
    pub blocking_issue: Option<String>,
    pub needs_input: Option<String>,
    pub needs_human_input: Option<bool>,
    pub pr_url: Option<String>,
    pub summary: Option<String>,
}

const SCOPE_KEYS: &[&str] = &[
    "summary",
    "confidence_score",
    "confidence_reasoning",
    "complexity",
    "action_plan",
    "risks",
    "questions",
];

const EXECUTE_KEYS: &[&str] = &[
    "current_task",
    "progress_percentage",
    "completed_steps",
    "blocking_issue",
    "needs_input",
    "needs_human_input",
    "pr_url",
    "summary",
];

#[derive(Debug, Clone, PartialEq)]
pub enum RenderedOutput {
    Lines(Vec<String>),
    /// Payload did not match the contract; pretty-printed as received.
    Raw(String),
}

impl ScopePlan {
    pub fn parse(value: &Value) -> Option<Self> {
        parse_contract(value, SCOPE_KEYS)
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(summary) = &self.summary {
            lines.push(format!("Summary: {}", summary));
        }
        if let Some(score) = self.confidence_score {
            let mut line = format!("Confidence: {:.0}/100", score);
            if let Some(reason) = &self.confidence_reasoning {
                line.push_str(&format!(" ({})", reason));
            }
            lines.push(line);
        }
        if let Some(complexity) = &self.complexity {
            lines.push(format!("Complexity: {}", complexity));
        }
        if !self.action_plan.is_empty() {
            lines.push("Plan:".to_string());
            for (i, step) in self.action_plan.iter().enumerate() {
                let label = match &step.step {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => (i + 1).to_string(),
                };
                lines.push(format!(
                    "  {}. {}",
                    label,
                    step.description.as_deref().unwrap_or("(no description)")
                ));
                if !step.files.is_empty() {
                    lines.push(format!("     files: {}", step.files.join(", ")));
                }
            }
        }
        push_list(&mut lines, "Risks:", &self.risks);
        push_list(&mut lines, "Open questions:", &self.questions);
        lines
    }
}

impl ExecutionProgress {
    pub fn parse(value: &Value) -> Option<Self> {
        parse_contract(value, EXECUTE_KEYS)
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(pct) = self.progress_percentage {
            lines.push(format!("Progress: {:.0}%", pct.clamp(0.0, 100.0)));
        }
        if let Some(task) = &self.current_task {
            lines.push(format!("Current task: {}", task));
        }
        if let Some(blocking) = self.blocking_issue.as_ref().or(self.needs_input.as_ref()) {
            lines.push(format!("Blocked: {}", blocking));
        } else if self.needs_human_input == Some(true) {
            lines.push("Blocked: waiting for a human".to_string());
        }
        push_list(&mut lines, "Completed:", &self.completed_steps);
        if let Some(url) = &self.pr_url {
            lines.push(format!("Pull request: {}", url));
        }
        if let Some(summary) = &self.summary {
            lines.push(format!("Summary: {}", summary));
        }
        lines
    }
}

/// Render a session's structured output for display.
pub fn render(kind: SessionKind, value: &Value) -> RenderedOutput {
    let lines = match kind {
        SessionKind::Scope => ScopePlan::parse(value).map(|plan| plan.lines()),
        SessionKind::Execute => ExecutionProgress::parse(value).map(|progress| progress.lines()),
    };
    match lines {
        Some(lines) if !lines.is_empty() => RenderedOutput::Lines(lines),
        _ => RenderedOutput::Raw(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())),
    }
}

fn parse_contract<T: for<'de> Deserialize<'de>>(value: &Value, keys: &[&str]) -> Option<T> {
    let map = value.as_object()?;
    if !keys.iter().any(|k| map.contains_key(*k)) {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

fn push_list(lines: &mut Vec<String>, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(heading.to_string());
    lines.extend(items.iter().map(|item| format!("  - {}", item)));
}
