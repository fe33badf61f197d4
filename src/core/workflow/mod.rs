use serde_json::Value;

/// Which of the two agent runs a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Scope,
    Execute,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Scope => "scope",
            SessionKind::Execute => "execute",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scope" => Some(SessionKind::Scope),
            "execute" => Some(SessionKind::Execute),
            _ => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            SessionKind::Scope => "Scope",
            SessionKind::Execute => "Execute",
        }
    }
}

/// Display category of a workflow status. Drives styling and aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Pending,
    Active,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WorkflowStatus {
    pub label: String,
    pub kind: StatusKind,
    pub detail: Option<String>,
    pub is_terminal: bool,
    pub needs_attention: bool,
}

impl WorkflowStatus {
    fn new(label: impl Into<String>, kind: StatusKind, is_terminal: bool) -> Self {
        Self {
            label: label.into(),
            kind,
            detail: None,
            is_terminal,
            needs_attention: false,
        }
    }

    fn with_attention(mut self) -> Self {
        self.needs_attention = true;
        self
    }

    fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }

    /// No session has been created for this slot yet.
    pub fn not_started() -> Self {
        Self::new("Not started", StatusKind::Pending, true)
    }

    /// A session exists but no fetch has succeeded yet.
    pub fn loading() -> Self {
        Self::new("Loading…", StatusKind::Pending, false)
    }
}

/// Map a raw platform status into the workflow state shown to the operator.
///
/// Total over its inputs: unknown status strings fall back to a non-terminal
/// pending status labelled with the raw value.
pub fn derive(
    kind: SessionKind,
    status_enum: Option<&str>,
    structured_output: Option<&Value>,
    pull_request_url: Option<&str>,
) -> WorkflowStatus {
    let Some(raw) = status_enum else {
        return WorkflowStatus::not_started();
    };

    match raw {
        "pending" | "queued" => WorkflowStatus::new("Queued", StatusKind::Pending, false),
        "running" => match kind {
            SessionKind::Scope => WorkflowStatus::new("Scoping…", StatusKind::Active, false),
            SessionKind::Execute => WorkflowStatus::new("Executing…", StatusKind::Active, false),
        },
        "blocked" => match kind {
            // The platform reports `blocked` once a scope run has produced its plan and
            // is holding for the next message, so output presence decides the meaning.
            SessionKind::Scope if has_structured_output(structured_output) => {
                WorkflowStatus::new("Awaiting approval", StatusKind::Success, true)
            }
            SessionKind::Scope => WorkflowStatus::new("Processing…", StatusKind::Active, false),
            SessionKind::Execute => WorkflowStatus::new("Needs input", StatusKind::Warning, false)
                .with_attention()
                .with_detail(blocking_reason(structured_output)),
        },
        "paused" => WorkflowStatus::new("Paused", StatusKind::Warning, false),
        "finished" => match kind {
            SessionKind::Scope => WorkflowStatus::new("Scoped", StatusKind::Success, true),
            SessionKind::Execute => {
                let pr = pull_request_url
                    .filter(|url| !url.trim().is_empty())
                    .map(str::to_string)
                    .or_else(|| non_empty_str(structured_output, "pr_url"));
                match pr {
                    Some(url) => WorkflowStatus::new("PR ready", StatusKind::Success, true)
                        .with_detail(Some(url)),
                    None => WorkflowStatus::new("Completed", StatusKind::Success, true),
                }
            }
        },
        "failed" => {
            let label = match kind {
                SessionKind::Scope => "Scope failed",
                SessionKind::Execute => "Execution failed",
            };
            WorkflowStatus::new(label, StatusKind::Error, true).with_attention()
        }
        "cancelled" => WorkflowStatus::new("Cancelled", StatusKind::Error, true),
        "expired" => WorkflowStatus::new("Expired", StatusKind::Error, true),
        other => WorkflowStatus::new(other, StatusKind::Pending, false),
    }
}

/// Present means a JSON value that is neither `null` nor an empty object.
pub fn has_structured_output(structured_output: Option<&Value>) -> bool {
    match structured_output {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Why an execute session is waiting on a human, if the agent said so.
pub fn blocking_reason(structured_output: Option<&Value>) -> Option<String> {
    non_empty_str(structured_output, "blocking_issue")
        .or_else(|| non_empty_str(structured_output, "needs_input"))
        .or_else(|| {
            let needs_human = structured_output
                .and_then(|v| v.get("needs_human_input"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if needs_human {
                non_empty_str(structured_output, "current_task")
            } else {
                None
            }
        })
}

fn non_empty_str(structured_output: Option<&Value>, key: &str) -> Option<String> {
    structured_output
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests;
