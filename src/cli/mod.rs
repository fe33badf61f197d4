mod context;
mod issues;
mod sessions;
mod watch;

use anyhow::{Result, anyhow, bail};
use console::style;

use crate::core::dashboard::Dashboard;
use crate::core::github::IssueState;
use crate::core::terminal::{self, GuideSection};
use crate::logging;
use crate::platform::{NativePlatform, Platform};
use context::AppContext;

fn print_help() {
    GuideSection::new("Issues")
        .command("issues [--state open|closed|all]", "List issues with their agent sessions")
        .command("show <number>", "Issue details, session status and agent output")
        .command("forget <number>", "Stop tracking the sessions of an issue")
        .print();

    GuideSection::new("Agent sessions")
        .command("scope <number>", "Ask the agent to analyse an issue and plan a fix")
        .command("execute <number>", "Ask the agent to implement the approved plan")
        .command("watch [<number>...]", "Live dashboard of recorded sessions")
        .print();

    GuideSection::new("Options")
        .command("--verbose, -v", "Mirror log output to stderr")
        .text("Config: <data dir>/config.toml, data dir from ISSUE_PILOT_DATA_DIR")
        .print();

    println!(
        "\n {} {} <command> [arguments]\n",
        style("Usage:").bold(),
        style("issue-pilot").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GlobalFlags {
    pub verbose: bool,
    /// Arguments after the program name with global flags removed.
    pub rest: Vec<String>,
}

pub(crate) fn parse_global_flags(args: &[String]) -> GlobalFlags {
    let mut verbose = false;
    let mut rest = Vec::new();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--verbose" | "-v" => verbose = true,
            _ => rest.push(arg.clone()),
        }
    }
    GlobalFlags { verbose, rest }
}

pub(crate) fn parse_state_flag(args: &[String], start: usize) -> Result<IssueState> {
    let mut state = IssueState::Open;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--state" | "-s" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow!("--state needs a value: open, closed or all"))?;
                state = IssueState::parse(value)
                    .ok_or_else(|| anyhow!("Unknown issue state '{}'. Expected open, closed or all", value))?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(state)
}

const COMMANDS: &[&str] = &["issues", "show", "scope", "execute", "watch", "forget"];

fn check_command(cmd: &str) -> Result<()> {
    if !COMMANDS.contains(&cmd) {
        bail!("Unknown command: {}", cmd);
    }
    Ok(())
}

/// Accepts `42` and `#42`, up to the largest number the session store can hold.
pub(crate) fn parse_issue_number(arg: &str) -> Result<u64> {
    let trimmed = arg.trim().trim_start_matches('#');
    match trimmed.parse::<u64>() {
        Ok(n) if n > 0 && i64::try_from(n).is_ok() => Ok(n),
        _ => bail!("'{}' is not an issue number", arg),
    }
}

pub(crate) fn parse_issue_numbers(args: &[String], start: usize) -> Result<Vec<u64>> {
    let mut numbers: Vec<u64> = args
        .iter()
        .skip(start)
        .map(|a| parse_issue_number(a))
        .collect::<Result<_>>()?;
    numbers.sort_unstable();
    numbers.dedup();
    Ok(numbers)
}

fn required_issue_number(args: &[String], command: &str) -> Result<u64> {
    match args.get(1) {
        Some(arg) => parse_issue_number(arg),
        None => bail!("Usage: issue-pilot {} <number>", command),
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let flags = parse_global_flags(&args);
    let args = flags.rest;

    let Some(cmd) = args.first().map(String::as_str) else {
        print_help();
        return Ok(());
    };
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }
    if let Err(err) = check_command(cmd) {
        print_help();
        return Err(err);
    }

    let data_dir = NativePlatform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    NativePlatform::restrict_dir_permissions(&data_dir);
    logging::init(&data_dir, flags.verbose)?;
    tracing::info!(command = cmd, data_dir = %data_dir.display(), "issue-pilot starting");

    let ctx = AppContext::load(&data_dir).await?;

    match cmd {
        "issues" => issues::run_list(&ctx, parse_state_flag(&args, 1)?).await,
        "show" => issues::run_show(&ctx, required_issue_number(&args, "show")?).await,
        "forget" => issues::run_forget(&ctx, required_issue_number(&args, "forget")?).await,
        "scope" => sessions::run_scope(&ctx, required_issue_number(&args, "scope")?).await,
        "execute" => sessions::run_execute(&ctx, required_issue_number(&args, "execute")?).await,
        "watch" => run_watch(&ctx, parse_issue_numbers(&args, 1)?).await,
        _ => bail!("Unknown command: {}", cmd),
    }
}

async fn run_watch(ctx: &AppContext, numbers: Vec<u64>) -> Result<()> {
    let repository = ctx.repository()?;
    let records: Vec<_> = ctx
        .store
        .list(&repository)
        .await?
        .into_iter()
        .filter(|r| numbers.is_empty() || numbers.contains(&r.issue_number))
        .collect();
    if records.is_empty() {
        terminal::print_info("No recorded sessions to watch. Start one with `issue-pilot scope <number>`.");
        return Ok(());
    }

    let dashboard = Dashboard::from_records(
        repository,
        ctx.platform()?,
        ctx.config.poller_config(),
        &records,
    )
    .await;
    let titles = issues::titles_for(ctx, &dashboard.issue_numbers()).await;
    let exit = watch::live(&dashboard, &titles, false).await;
    dashboard.dispose().await;
    exit.map(|_| ())
}
