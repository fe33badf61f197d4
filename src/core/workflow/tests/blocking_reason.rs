use serde_json::json;

use crate::core::workflow::blocking_reason;

#[test]
fn prefers_blocking_issue_over_other_fields() {
    let output = json!({
        "blocking_issue": "Need staging credentials",
        "needs_input": "Pick a name",
        "needs_human_input": true,
        "current_task": "Writing tests"
    });
    assert_eq!(
        blocking_reason(Some(&output)).as_deref(),
        Some("Need staging credentials")
    );
}

#[test]
fn falls_back_to_needs_input_when_blocking_issue_is_blank() {
    let output = json!({ "blocking_issue": "   ", "needs_input": "Pick a name" });
    assert_eq!(blocking_reason(Some(&output)).as_deref(), Some("Pick a name"));
}

#[test]
fn uses_current_task_only_when_human_input_flag_is_true() {
    let flagged = json!({ "needs_human_input": true, "current_task": "Confirm API shape" });
    assert_eq!(
        blocking_reason(Some(&flagged)).as_deref(),
        Some("Confirm API shape")
    );

    let unflagged = json!({ "needs_human_input": false, "current_task": "Confirm API shape" });
    assert_eq!(blocking_reason(Some(&unflagged)), None);

    let stringly = json!({ "needs_human_input": "true", "current_task": "Confirm API shape" });
    assert_eq!(blocking_reason(Some(&stringly)), None);
}

#[test]
fn non_string_fields_are_ignored() {
    let output = json!({ "blocking_issue": 42, "needs_input": ["a"] });
    assert_eq!(blocking_reason(Some(&output)), None);
    assert_eq!(blocking_reason(None), None);
}
