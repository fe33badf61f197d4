use std::collections::HashMap;

use anyhow::{Result, bail};
use tracing::info;

use super::context::AppContext;
use super::issues::print_structured;
use super::watch::{self, WatchExit};
use crate::core::dashboard::Dashboard;
use crate::core::github::IssueSource;
use crate::core::prompts::{execute_prompt, scope_prompt, session_title};
use crate::core::terminal;
use crate::core::workflow::{SessionKind, has_structured_output};

pub(crate) async fn run_scope(ctx: &AppContext, number: u64) -> Result<()> {
    let repository = ctx.repository()?;
    let platform = ctx.platform()?;
    let issue = ctx.issue_source()?.get_issue(number).await?;

    if let Some(existing) = ctx.store.get(&repository, number, SessionKind::Scope).await? {
        terminal::print_warn(&format!(
            "Replacing scope session {} recorded for #{}.",
            existing.session_id, number
        ));
    }

    terminal::print_step(&format!("Starting scope session for #{}", number));
    let request = ctx.config.session_request(
        scope_prompt(&repository, &issue),
        session_title(SessionKind::Scope, &issue),
    );
    let session = platform.create_session(&request).await?;
    ctx.store
        .record(&repository, number, SessionKind::Scope, &session.session_id)
        .await?;
    info!(issue = number, session_id = %session.session_id, "Scope session created");
    announce(SessionKind::Scope, &session.session_id, session.url.as_deref());

    follow(ctx, number, SessionKind::Scope, &session.session_id, &issue.title).await
}

pub(crate) async fn run_execute(ctx: &AppContext, number: u64) -> Result<()> {
    let repository = ctx.repository()?;
    let platform = ctx.platform()?;

    let Some(scope) = ctx.store.get(&repository, number, SessionKind::Scope).await? else {
        bail!("#{} has not been scoped yet. Run `issue-pilot scope {}` first.", number, number);
    };
    let scope_session = platform.get_session(&scope.session_id).await?;
    let plan = match scope_session.structured_output {
        Some(plan) if has_structured_output(Some(&plan)) => plan,
        _ => bail!(
            "Scope session {} has not produced a plan yet. Check it with `issue-pilot show {}`.",
            scope.session_id,
            number
        ),
    };

    let issue = ctx.issue_source()?.get_issue(number).await?;
    terminal::print_step(&format!("Starting execute session for #{}", number));
    let request = ctx.config.session_request(
        execute_prompt(&repository, &issue, &plan),
        session_title(SessionKind::Execute, &issue),
    );
    let session = platform.create_session(&request).await?;
    ctx.store
        .record(&repository, number, SessionKind::Execute, &session.session_id)
        .await?;
    info!(issue = number, session_id = %session.session_id, "Execute session created");
    announce(SessionKind::Execute, &session.session_id, session.url.as_deref());

    follow(ctx, number, SessionKind::Execute, &session.session_id, &issue.title).await
}

fn announce(kind: SessionKind, session_id: &str, url: Option<&str>) {
    terminal::print_success(&format!("{} session {} created.", kind.title(), session_id));
    if let Some(url) = url {
        terminal::print_link("Session", url);
    }
}

/// Watch the new session until it settles, then print its final output.
async fn follow(
    ctx: &AppContext,
    number: u64,
    kind: SessionKind,
    session_id: &str,
    title: &str,
) -> Result<()> {
    let repository = ctx.repository()?;
    let mut dashboard = Dashboard::new(repository, ctx.platform()?, ctx.config.poller_config());
    dashboard.attach(number, kind, session_id).await;
    let titles = HashMap::from([(number, title.to_string())]);

    let exit = watch::live(&dashboard, &titles, true).await;
    let snapshot = dashboard.watch(number).and_then(|w| w.snapshot(kind));
    dashboard.dispose().await;

    match exit? {
        WatchExit::Interrupted => {
            terminal::print_info(&format!(
                "Stopped watching. Resume with `issue-pilot watch {}`.",
                number
            ));
        }
        WatchExit::Settled => {
            if let Some(snapshot) = snapshot {
                let status = snapshot.workflow_status();
                println!("\n {} {}", kind.title(), terminal::status_pill(&status));
                if let Some(notice) = snapshot.notice() {
                    terminal::print_warn(&notice);
                }
                if let Some(session) = &snapshot.data {
                    print_structured(kind, session.structured_output.as_ref());
                }
            }
        }
    }
    Ok(())
}
