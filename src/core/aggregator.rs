//! Reduces the scope and execute pollers of one issue into a single summary.

use chrono::{DateTime, Utc};

use crate::core::poller::PollerSnapshot;
use crate::core::workflow::{SessionKind, WorkflowStatus};

/// Longest attention text shown in compact views before it is cut.
pub const COMPACT_ATTENTION_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionPill {
    pub kind: SessionKind,
    pub session_id: String,
    pub status: WorkflowStatus,
    pub degraded: bool,
    pub exhausted: bool,
    /// Countdown or retry hint while the poller is degraded or stalled.
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionMessage {
    pub kind: SessionKind,
    pub full: String,
    pub compact: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueSessionSummary {
    /// Scope first, then execute.
    pub pills: Vec<SessionPill>,
    pub attention: Option<AttentionMessage>,
    pub latest_update: Option<DateTime<Utc>>,
}

impl IssueSessionSummary {
    pub fn latest_update_label(&self, now: DateTime<Utc>) -> Option<String> {
        self.latest_update.map(|ts| relative_time(ts, now))
    }
}

/// Summarize the sessions of one issue. `None` when neither session exists.
pub fn summarize(
    scope: Option<&PollerSnapshot>,
    execute: Option<&PollerSnapshot>,
) -> Option<IssueSessionSummary> {
    if scope.is_none() && execute.is_none() {
        return None;
    }

    let present: Vec<&PollerSnapshot> = [scope, execute].into_iter().flatten().collect();

    let pills = present.iter().map(|snap| pill(snap)).collect();

    let attention = [execute, scope]
        .into_iter()
        .flatten()
        .find_map(|snap| attention_for(snap));

    let latest_update = present
        .iter()
        .filter_map(|snap| snap.data.as_ref())
        .filter_map(|session| session.updated_at_utc())
        .max();

    Some(IssueSessionSummary {
        pills,
        attention,
        latest_update,
    })
}

fn pill(snap: &PollerSnapshot) -> SessionPill {
    SessionPill {
        kind: snap.kind,
        session_id: snap.session_id.clone(),
        status: snap.workflow_status(),
        degraded: snap.is_degraded(),
        exhausted: snap.is_exhausted(),
        notice: snap.notice(),
    }
}

fn attention_for(snap: &PollerSnapshot) -> Option<AttentionMessage> {
    let status = snap.status.as_ref().filter(|s| s.needs_attention)?;
    let full = status.detail.clone().unwrap_or_else(|| status.label.clone());
    Some(AttentionMessage {
        kind: snap.kind,
        compact: truncate(&full, COMPACT_ATTENTION_CHARS),
        full,
    })
}

/// Cut `text` to `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

/// "just now", "5m ago", "3h ago", "2d ago".
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent_platform::{ErrorClass, Session};
    use crate::core::poller::{PollError, PollerPhase};
    use crate::core::workflow::{StatusKind, derive};
    use chrono::{Duration, TimeZone};
    use serde_json::{Value, json};

    fn snapshot(
        kind: SessionKind,
        status: Option<&str>,
        output: Option<Value>,
        updated_at: Option<&str>,
    ) -> PollerSnapshot {
        let data = status.map(|raw| Session {
            session_id: format!("{}-1", kind.as_str()),
            url: None,
            title: None,
            status_enum: Some(raw.to_string()),
            structured_output: output.clone(),
            pull_request: None,
            updated_at: updated_at.map(str::to_string),
        });
        PollerSnapshot {
            session_id: format!("{}-1", kind.as_str()),
            kind,
            phase: if data.is_some() {
                PollerPhase::Normal
            } else {
                PollerPhase::Fetching
            },
            status: status.map(|raw| derive(kind, Some(raw), output.as_ref(), None)),
            data,
            failure_count: 0,
            next_retry_in_secs: None,
            last_error: None,
            last_success_at: None,
        }
    }

    #[test]
    fn nothing_to_summarize_without_sessions() {
        assert!(summarize(None, None).is_none());
    }

    #[test]
    fn pills_are_ordered_scope_then_execute() {
        let scope = snapshot(SessionKind::Scope, Some("finished"), None, None);
        let execute = snapshot(SessionKind::Execute, Some("running"), None, None);
        let summary = summarize(Some(&scope), Some(&execute)).unwrap();
        let kinds: Vec<_> = summary.pills.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![SessionKind::Scope, SessionKind::Execute]);
        assert_eq!(summary.pills[0].status.label, "Scoped");
        assert_eq!(summary.pills[1].status.label, "Executing…");
    }

    #[test]
    fn pill_before_first_success_is_loading() {
        let scope = snapshot(SessionKind::Scope, None, None, None);
        let summary = summarize(Some(&scope), None).unwrap();
        assert_eq!(summary.pills.len(), 1);
        assert_eq!(summary.pills[0].status.label, "Loading…");
        assert_eq!(summary.pills[0].status.kind, StatusKind::Pending);
        assert!(summary.latest_update.is_none());
        assert!(summary.attention.is_none());
    }

    #[test]
    fn execute_attention_wins_over_scope() {
        let scope = snapshot(SessionKind::Scope, Some("failed"), None, None);
        let execute = snapshot(
            SessionKind::Execute,
            Some("blocked"),
            Some(json!({ "blocking_issue": "Which database should the migration target?" })),
            None,
        );
        let summary = summarize(Some(&scope), Some(&execute)).unwrap();
        let attention = summary.attention.unwrap();
        assert_eq!(attention.kind, SessionKind::Execute);
        assert_eq!(attention.full, "Which database should the migration target?");
    }

    #[test]
    fn scope_attention_used_when_execute_is_quiet() {
        let scope = snapshot(SessionKind::Scope, Some("failed"), None, None);
        let execute = snapshot(SessionKind::Execute, Some("running"), None, None);
        let attention = summarize(Some(&scope), Some(&execute))
            .unwrap()
            .attention
            .unwrap();
        assert_eq!(attention.kind, SessionKind::Scope);
        assert_eq!(attention.full, "Scope failed");
    }

    #[test]
    fn long_attention_is_truncated_for_compact_display() {
        let reason = "Need credentials for the staging payment gateway before running the integration suite";
        let execute = snapshot(
            SessionKind::Execute,
            Some("blocked"),
            Some(json!({ "needs_input": reason })),
            None,
        );
        let attention = summarize(None, Some(&execute)).unwrap().attention.unwrap();
        assert_eq!(attention.full, reason);
        assert_eq!(attention.compact.chars().count(), COMPACT_ATTENTION_CHARS + 1);
        assert!(attention.compact.ends_with('…'));
        assert!(reason.starts_with(attention.compact.trim_end_matches('…')));
    }

    #[test]
    fn latest_update_is_the_newest_delivered_session() {
        let scope = snapshot(
            SessionKind::Scope,
            Some("finished"),
            None,
            Some("2026-03-01T10:00:00Z"),
        );
        let execute = snapshot(
            SessionKind::Execute,
            Some("running"),
            None,
            Some("2026-03-01T11:30:00Z"),
        );
        let summary = summarize(Some(&scope), Some(&execute)).unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 11, 30, 0).unwrap();
        assert_eq!(summary.latest_update, Some(expected));
        assert_eq!(
            summary.latest_update_label(expected + Duration::minutes(5)),
            Some("5m ago".to_string())
        );
    }

    #[test]
    fn degraded_poller_keeps_its_last_status_and_notice() {
        let mut scope = snapshot(SessionKind::Scope, Some("running"), None, None);
        scope.phase = PollerPhase::BackingOff;
        scope.failure_count = 2;
        scope.next_retry_in_secs = Some(4);
        scope.last_error = Some(PollError {
            class: ErrorClass::Transient,
            status: Some(503),
            message: "Agent platform temporarily unavailable (HTTP 503).".into(),
        });
        let pill = &summarize(Some(&scope), None).unwrap().pills[0];
        assert!(pill.degraded);
        assert!(!pill.exhausted);
        assert_eq!(pill.status.label, "Scoping…");
        assert_eq!(
            pill.notice.as_deref(),
            Some("Agent platform temporarily unavailable (HTTP 503). Retrying in 4s.")
        );
    }

    #[test]
    fn relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(relative_time(now + Duration::minutes(1), now), "just now");
    }

    #[test]
    fn truncate_leaves_short_text_alone() {
        assert_eq!(truncate("Needs input", 50), "Needs input");
        assert_eq!(truncate("ééééé", 3), "ééé…");
    }
}
