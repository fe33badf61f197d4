//! Prompt templates that ask the agent to keep `structured_output` in a known shape.

use serde_json::Value;

use crate::core::github::Issue;
use crate::core::workflow::SessionKind;

const SCOPE_OUTPUT_SHAPE: &str = r#"{
  "summary": "one paragraph restating the problem",
  "confidence_score": 0-100,
  "confidence_reasoning": "why you are or are not confident",
  "complexity": "low | medium | high",
  "action_plan": [
    { "step": 1, "description": "what to change", "files": ["path/to/file"] }
  ],
  "risks": ["what could go wrong"],
  "questions": ["anything a maintainer must answer first"]
}"#;

const EXECUTE_OUTPUT_SHAPE: &str = r#"{
  "current_task": "what you are doing right now",
  "progress_percentage": 0-100,
  "completed_steps": ["steps from the plan that are done"],
  "blocking_issue": "set when you cannot continue, otherwise null",
  "needs_input": "a question for the maintainer, otherwise null",
  "needs_human_input": false,
  "pr_url": "URL of the pull request once opened, otherwise null",
  "summary": "short summary of the change"
}"#;

pub fn session_title(kind: SessionKind, issue: &Issue) -> String {
    format!("{} #{}: {}", kind.title(), issue.number, issue.title)
}

pub fn scope_prompt(repository: &str, issue: &Issue) -> String {
    format!(
        "You are scoping GitHub issue #{number} in the repository {repository}.\n\
         \n\
         Title: {title}\n\
         URL: {url}\n\
         \n\
         Issue description:\n\
         {body}\n\
         \n\
         Investigate the codebase and work out how this issue should be resolved. \
         Do NOT modify any code, create branches or open pull requests in this session.\n\
         \n\
         Keep your structured output updated as you learn more, using exactly this JSON shape:\n\
         {shape}\n\
         \n\
         When the plan is complete, set the final structured output and wait for approval.",
        number = issue.number,
        repository = repository,
        title = issue.title,
        url = issue.html_url,
        body = issue_body(issue),
        shape = SCOPE_OUTPUT_SHAPE,
    )
}

/// `plan` is the scope session's structured output.
pub fn execute_prompt(repository: &str, issue: &Issue, plan: &Value) -> String {
    let plan = serde_json::to_string_pretty(plan).unwrap_or_else(|_| plan.to_string());
    format!(
        "You are resolving GitHub issue #{number} in the repository {repository}.\n\
         \n\
         Title: {title}\n\
         URL: {url}\n\
         \n\
         Issue description:\n\
         {body}\n\
         \n\
         A maintainer approved the following plan:\n\
         {plan}\n\
         \n\
         Implement the plan, run the relevant tests and open a pull request that references #{number}. \
         If you get stuck or need a decision, say so in your structured output instead of guessing.\n\
         \n\
         Keep your structured output updated throughout, using exactly this JSON shape:\n\
         {shape}",
        number = issue.number,
        repository = repository,
        title = issue.title,
        url = issue.html_url,
        body = issue_body(issue),
        plan = plan,
        shape = EXECUTE_OUTPUT_SHAPE,
    )
}

fn issue_body(issue: &Issue) -> &str {
    match issue.body.as_deref().map(str::trim) {
        Some(body) if !body.is_empty() => body,
        _ => "(no description provided)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(body: Option<&str>) -> Issue {
        serde_json::from_value(json!({
            "number": 42,
            "title": "Crash when config is empty",
            "body": body,
            "html_url": "https://github.com/acme/widgets/issues/42",
            "state": "open",
            "updated_at": "2026-03-01T10:15:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn titles_name_kind_number_and_issue() {
        let issue = issue(None);
        assert_eq!(
            session_title(SessionKind::Scope, &issue),
            "Scope #42: Crash when config is empty"
        );
        assert_eq!(
            session_title(SessionKind::Execute, &issue),
            "Execute #42: Crash when config is empty"
        );
    }

    #[test]
    fn scope_prompt_describes_issue_and_contract() {
        let prompt = scope_prompt("acme/widgets", &issue(Some("Steps: run with `{}`")));
        assert!(prompt.contains("issue #42 in the repository acme/widgets"));
        assert!(prompt.contains("Steps: run with `{}`"));
        assert!(prompt.contains("https://github.com/acme/widgets/issues/42"));
        assert!(prompt.contains("Do NOT modify any code"));
        for key in ["confidence_score", "action_plan", "risks", "questions"] {
            assert!(prompt.contains(key), "missing {}", key);
        }
    }

    #[test]
    fn missing_body_is_called_out() {
        let prompt = scope_prompt("acme/widgets", &issue(Some("   ")));
        assert!(prompt.contains("(no description provided)"));
    }

    #[test]
    fn execute_prompt_embeds_the_plan() {
        let plan = json!({ "summary": "Default to an empty map", "confidence_score": 80 });
        let prompt = execute_prompt("acme/widgets", &issue(None), &plan);
        assert!(prompt.contains("\"summary\": \"Default to an empty map\""));
        assert!(prompt.contains("open a pull request that references #42"));
        for key in ["blocking_issue", "needs_human_input", "pr_url", "progress_percentage"] {
            assert!(prompt.contains(key), "missing {}", key);
        }
    }
}
