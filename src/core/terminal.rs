use chrono::{DateTime, Utc};
use console::{Emoji, StyledObject, style};

use crate::core::aggregator::{IssueSessionSummary, SessionPill};
use crate::core::workflow::{StatusKind, WorkflowStatus};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static BELL: Emoji<'_, '_> = Emoji("🔔 ", "! ");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {}: {}", style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", ROCKET, style(step).bold());
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

/// Titled block of aligned command descriptions for help screens.
pub struct GuideSection {
    title: String,
    lines: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines
            .push(format!("  {} {}", style(format!("{:<28}", name)).green(), description));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(format!("  {}", text));
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        for line in &self.lines {
            println!("{}", line);
        }
    }
}

fn tint<D>(kind: StatusKind, value: D) -> StyledObject<D> {
    match kind {
        StatusKind::Pending => style(value).dim(),
        StatusKind::Active => style(value).cyan(),
        StatusKind::Success => style(value).green(),
        StatusKind::Warning => style(value).yellow(),
        StatusKind::Error => style(value).red(),
    }
}

/// `[Scoped]`, coloured by status kind.
pub fn status_pill(status: &WorkflowStatus) -> String {
    tint(status.kind, format!("[{}]", status.label)).bold().to_string()
}

/// `Scope [Scoping…] · retrying in 4s`
pub fn session_pill(pill: &SessionPill) -> String {
    let mut line = format!("{} {}", pill.kind.title(), status_pill(&pill.status));
    if let Some(notice) = &pill.notice {
        let notice = if pill.exhausted {
            style(notice.as_str()).red()
        } else {
            style(notice.as_str()).yellow()
        };
        line.push_str(&format!(" · {}", notice));
    }
    line
}

/// One dashboard row: pills, the compact attention text and the last update.
pub fn summary_line(summary: &IssueSessionSummary, now: DateTime<Utc>) -> String {
    let mut parts: Vec<String> = summary.pills.iter().map(session_pill).collect();
    if let Some(attention) = &summary.attention {
        parts.push(format!("{}{}", BELL, style(&attention.compact).yellow()));
    }
    if let Some(updated) = summary.latest_update_label(now) {
        parts.push(style(format!("updated {}", updated)).dim().to_string());
    }
    parts.join("  ")
}

pub fn issue_heading(number: u64, title: &str) -> String {
    format!("{} {}", style(format!("#{}", number)).bold().cyan(), title)
}
