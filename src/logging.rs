use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

pub(crate) const LOG_LEVEL_ENV: &str = "ISSUE_PILOT_LOG";
pub(crate) const LOG_FILE: &str = "issue-pilot.log";

/// Appends formatted events to the log file, optionally echoing them to stderr.
///
/// Stdout is left alone so log lines never land in the middle of a redraw.
#[derive(Clone)]
pub(crate) struct LogFileMakeWriter {
    file: Arc<Mutex<File>>,
    mirror_stderr: bool,
}

impl LogFileMakeWriter {
    pub(crate) fn open(path: &Path, mirror_stderr: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            mirror_stderr,
        })
    }
}

impl<'a> MakeWriter<'a> for LogFileMakeWriter {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter {
            file: self.file.clone(),
            mirror_stderr: self.mirror_stderr,
        }
    }
}

pub(crate) struct LogFileWriter {
    file: Arc<Mutex<File>>,
    mirror_stderr: bool,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut file) = self.file.lock() {
            file.write_all(buf)?;
        }
        if self.mirror_stderr {
            std::io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Ok(mut file) = self.file.lock() {
            file.flush()?;
        }
        if self.mirror_stderr {
            std::io::stderr().flush()?;
        }
        Ok(())
    }
}

pub(crate) fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("logs").join(LOG_FILE)
}

/// Level from `ISSUE_PILOT_LOG`, `info` when unset or unrecognised.
pub(crate) fn parse_level(value: Option<&str>) -> Level {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("error") => Level::ERROR,
        Some("warn") => Level::WARN,
        Some("debug") => Level::DEBUG,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Install the global subscriber. Returns the log file path.
pub(crate) fn init(data_dir: &Path, verbose: bool) -> Result<PathBuf> {
    let path = log_path(data_dir);
    let make_writer = LogFileMakeWriter::open(&path, verbose)?;
    let level = parse_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref());

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the tracing subscriber")?;
    Ok(path)
}
