use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use console::style;

use super::context::AppContext;
use super::watch;
use crate::core::aggregator::relative_time;
use crate::core::dashboard::Dashboard;
use crate::core::github::{IssueSource, IssueState};
use crate::core::structured::{RenderedOutput, render};
use crate::core::terminal::{self, issue_heading, summary_line};
use crate::core::workflow::SessionKind;

pub(crate) async fn run_list(ctx: &AppContext, state: IssueState) -> Result<()> {
    let repository = ctx.repository()?;
    let issues = ctx.issue_source()?.list_issues(state).await?;
    if issues.is_empty() {
        terminal::print_info(&format!("No {} issues in {}.", state.as_str(), repository));
        return Ok(());
    }

    let records = ctx.store.list(&repository).await?;
    let dashboard = if records.is_empty() {
        None
    } else {
        let dashboard = Dashboard::from_records(
            repository.clone(),
            ctx.platform()?,
            ctx.config.poller_config(),
            &records,
        )
        .await;
        watch::first_reports(&dashboard).await;
        Some(dashboard)
    };

    let now = Utc::now();
    println!(
        "\n {} {} issues in {}\n",
        style(issues.len()).bold(),
        state.as_str(),
        style(&repository).cyan()
    );
    for issue in &issues {
        let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
        let mut heading = issue_heading(issue.number, &issue.title);
        if !labels.is_empty() {
            heading.push_str(&format!(" {}", style(format!("({})", labels.join(", "))).dim()));
        }
        println!("{}", heading);
        let summary = dashboard
            .as_ref()
            .and_then(|d| d.watch(issue.number))
            .and_then(|w| w.summary());
        match summary {
            Some(summary) => println!("    {}", summary_line(&summary, now)),
            None => println!(
                "    {}",
                style(format!("no sessions · updated {}", relative_time(issue.updated_at, now))).dim()
            ),
        }
    }
    println!();

    if let Some(dashboard) = dashboard {
        dashboard.dispose().await;
    }
    Ok(())
}

pub(crate) async fn run_show(ctx: &AppContext, number: u64) -> Result<()> {
    let repository = ctx.repository()?;
    let issue = ctx.issue_source()?.get_issue(number).await?;

    println!("\n{}", issue_heading(issue.number, &issue.title));
    terminal::print_link("Issue", &issue.html_url);
    if !issue.labels.is_empty() {
        let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
        terminal::print_status("Labels", &labels.join(", "));
    }
    terminal::print_status("State", &issue.state);
    if let Some(body) = issue.body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        println!();
        for line in body.lines() {
            println!("  {}", line);
        }
    }

    let records = ctx.store.for_issue(&repository, number).await?;
    if records.is_empty() {
        println!();
        terminal::print_info(&format!("No agent sessions yet. Run `issue-pilot scope {}` to start one.", number));
        return Ok(());
    }

    let dashboard = Dashboard::from_records(
        repository,
        ctx.platform()?,
        ctx.config.poller_config(),
        &records,
    )
    .await;
    watch::first_reports(&dashboard).await;

    if let Some(issue_watch) = dashboard.watch(number) {
        if let Some(summary) = issue_watch.summary() {
            println!("\n  {}", summary_line(&summary, Utc::now()));
            if let Some(attention) = &summary.attention {
                terminal::print_warn(&attention.full);
            }
        }
        for kind in [SessionKind::Scope, SessionKind::Execute] {
            let Some(snapshot) = issue_watch.snapshot(kind) else {
                continue;
            };
            println!("\n {}", style(format!("{} session {}", kind.title(), snapshot.session_id)).bold());
            if let Some(notice) = snapshot.notice() {
                terminal::print_warn(&notice);
            }
            let Some(session) = &snapshot.data else {
                continue;
            };
            if let Some(url) = &session.url {
                terminal::print_link("Session", url);
            }
            if let Some(pr) = session.pull_request_url() {
                terminal::print_link("Pull request", pr);
            }
            print_structured(kind, session.structured_output.as_ref());
        }
    }
    println!();

    dashboard.dispose().await;
    Ok(())
}

pub(crate) fn print_structured(kind: SessionKind, output: Option<&serde_json::Value>) {
    let Some(value) = output.filter(|v| !v.is_null()) else {
        println!("  {}", style("No structured output yet.").dim());
        return;
    };
    match render(kind, value) {
        RenderedOutput::Lines(lines) => {
            for line in lines {
                println!("  {}", line);
            }
        }
        RenderedOutput::Raw(raw) => {
            println!("  {}", style("Output did not match the expected shape; raw JSON:").dim());
            for line in raw.lines() {
                println!("  {}", line);
            }
        }
    }
}

pub(crate) async fn run_forget(ctx: &AppContext, number: u64) -> Result<()> {
    let repository = ctx.repository()?;
    let removed = ctx.store.forget_issue(&repository, number).await?;
    if removed == 0 {
        terminal::print_info(&format!("No sessions recorded for #{}.", number));
    } else {
        terminal::print_success(&format!(
            "Forgot {} session(s) for #{}. They keep running on the agent platform.",
            removed, number
        ));
    }
    Ok(())
}

/// Titles for the dashboard, fetched best-effort.
pub(crate) async fn titles_for(ctx: &AppContext, numbers: &[u64]) -> HashMap<u64, String> {
    let mut titles = HashMap::new();
    let Ok(source) = ctx.issue_source() else {
        return titles;
    };
    for &number in numbers {
        match source.get_issue(number).await {
            Ok(issue) => {
                titles.insert(number, issue.title);
            }
            Err(e) => tracing::warn!(issue = number, error = %e, "Could not fetch issue title"),
        }
    }
    titles
}
