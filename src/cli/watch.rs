use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use console::{Term, style};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::core::dashboard::Dashboard;
use crate::core::terminal::{self, issue_heading, summary_line};

/// How long one-shot commands wait for the first fetch of each session.
const FIRST_REPORT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchExit {
    Interrupted,
    Settled,
}

/// Redraw `dashboard` on every snapshot until Ctrl-C, or until every poller
/// has stopped when `until_settled` is set. Enter retries exhausted pollers.
pub(crate) async fn live(
    dashboard: &Dashboard,
    titles: &HashMap<u64, String>,
    until_settled: bool,
) -> Result<WatchExit> {
    let term = Term::stdout();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    draw(&term, dashboard, titles, until_settled)?;
    loop {
        if until_settled && dashboard.has_reported() && dashboard.is_settled() {
            return Ok(WatchExit::Settled);
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping pollers");
                return Ok(WatchExit::Interrupted);
            }
            _ = dashboard.changed() => {}
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(_)) => {
                    let retried = dashboard.retry_stalled();
                    debug!(retried, "Manual retry from dashboard");
                }
                _ => stdin_open = false,
            },
        }
        draw(&term, dashboard, titles, until_settled)?;
    }
}

/// Wait until every poller has reported once, or give up after a timeout.
pub(crate) async fn first_reports(dashboard: &Dashboard) {
    let wait = async {
        while !dashboard.has_reported() {
            dashboard.changed().await;
        }
    };
    if tokio::time::timeout(FIRST_REPORT_TIMEOUT, wait).await.is_err() {
        terminal::print_warn("Some sessions did not answer in time; showing what is known.");
    }
}

fn draw(
    term: &Term,
    dashboard: &Dashboard,
    titles: &HashMap<u64, String>,
    until_settled: bool,
) -> Result<()> {
    term.clear_screen()?;
    for line in render(dashboard, titles, Utc::now()) {
        term.write_line(&line)?;
    }
    let hint = if until_settled {
        "Enter: retry stalled sessions · Ctrl-C: stop watching (sessions keep running)"
    } else {
        "Enter: retry stalled sessions · Ctrl-C: quit"
    };
    term.write_line("")?;
    term.write_line(&style(hint).dim().to_string())?;
    Ok(())
}

pub(crate) fn render(
    dashboard: &Dashboard,
    titles: &HashMap<u64, String>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut lines = vec![
        style(format!("Agent sessions for {}", dashboard.repository()))
            .bold()
            .to_string(),
        String::new(),
    ];
    for (number, summary) in dashboard.summaries() {
        let title = titles.get(&number).map(String::as_str).unwrap_or("");
        lines.push(issue_heading(number, title));
        lines.push(format!("    {}", summary_line(&summary, now)));
    }
    lines
}
