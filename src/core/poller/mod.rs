//! Live polling of a single agent session.
//!
//! Each [`PollerHandle`] owns one tokio task that fetches the session, derives
//! its workflow status and decides when to fetch again. Snapshots are pushed
//! to observers through a `watch` channel; the only input is `retry()`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::agent_platform::{ErrorClass, PlatformError, Session, SessionPlatform};
use crate::core::backoff::BackoffPolicy;
use crate::core::workflow::{SessionKind, WorkflowStatus, derive};

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollerConfig {
    /// Delay between fetches while the session is healthy and still running.
    pub interval: Duration,
    /// Consecutive failures (post-increment) that stop automatic polling.
    pub failure_threshold: u32,
    pub backoff: BackoffPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(15_000),
            failure_threshold: 5,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerPhase {
    Idle,
    Fetching,
    Normal,
    BackingOff,
    Exhausted,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PollError {
    pub class: ErrorClass,
    pub status: Option<u16>,
    pub message: String,
}

/// Everything a caller needs to render one poller.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerSnapshot {
    pub session_id: String,
    pub kind: SessionKind,
    pub phase: PollerPhase,
    /// Last successfully fetched session; kept across failures.
    pub data: Option<Session>,
    /// Status derived from `data`, recomputed on every success.
    pub status: Option<WorkflowStatus>,
    pub failure_count: u32,
    /// Seconds until the next attempt, only while backing off.
    pub next_retry_in_secs: Option<u64>,
    pub last_error: Option<PollError>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl PollerSnapshot {
    fn new(session_id: String, kind: SessionKind) -> Self {
        Self {
            session_id,
            kind,
            phase: PollerPhase::Idle,
            data: None,
            status: None,
            failure_count: 0,
            next_retry_in_secs: None,
            last_error: None,
            last_success_at: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.phase == PollerPhase::BackingOff
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == PollerPhase::Exhausted
    }

    pub fn workflow_status(&self) -> WorkflowStatus {
        self.status.clone().unwrap_or_else(WorkflowStatus::loading)
    }

    /// Operator-facing line describing a degraded or stalled poller.
    pub fn notice(&self) -> Option<String> {
        let error = self.last_error.as_ref()?;
        match self.phase {
            PollerPhase::BackingOff => Some(match self.next_retry_in_secs {
                Some(secs) => format!("{} Retrying in {}s.", error.message, secs),
                None => error.message.clone(),
            }),
            PollerPhase::Exhausted => Some(format!("{} Press retry to poll again.", error.message)),
            _ => None,
        }
    }
}

enum PollerCommand {
    Retry,
}

/// Owner-side handle of a running poller. Dropping it stops the task.
pub struct PollerHandle {
    session_id: String,
    commands: mpsc::UnboundedSender<PollerCommand>,
    snapshots: watch::Receiver<PollerSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Start polling `session_id`. The first fetch happens immediately.
    pub fn spawn(
        platform: Arc<dyn SessionPlatform>,
        session_id: impl Into<String>,
        kind: SessionKind,
        config: PollerConfig,
    ) -> Self {
        let session_id = session_id.into();
        let snapshot = PollerSnapshot::new(session_id.clone(), kind);
        let (publisher, snapshots) = watch::channel(snapshot.clone());
        let (commands, inbox) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let poller = SessionPoller {
            platform,
            config,
            snapshot,
            publisher,
            inbox,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(poller.run());

        Self {
            session_id,
            commands,
            snapshots,
            cancel,
            task: Some(task),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self) -> PollerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerSnapshot> {
        self.snapshots.clone()
    }

    /// Reset the failure count and fetch now, from any phase.
    pub fn retry(&self) {
        if self.commands.send(PollerCommand::Retry).is_err() {
            debug!(session_id = %self.session_id, "Retry ignored, poller already stopped");
        }
    }

    /// Stop the poller and wait until its timers are gone.
    pub async fn dispose(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Next {
    After(Duration),
    Backoff(Duration),
    Idle,
}

#[derive(Debug, PartialEq, Eq)]
enum Wake {
    Timer,
    Retry,
    Shutdown,
}

enum WaitEvent {
    Cancelled,
    Command(Option<PollerCommand>),
    Due,
    Tick,
}

struct SessionPoller {
    platform: Arc<dyn SessionPlatform>,
    config: PollerConfig,
    snapshot: PollerSnapshot,
    publisher: watch::Sender<PollerSnapshot>,
    inbox: mpsc::UnboundedReceiver<PollerCommand>,
    cancel: CancellationToken,
}

impl SessionPoller {
    async fn run(mut self) {
        debug!(session_id = %self.snapshot.session_id, kind = self.snapshot.kind.as_str(), "Session poller started");
        loop {
            let Some(result) = self.fetch().await else {
                break;
            };
            let next = match result {
                Ok(session) => self.on_success(session),
                Err(err) => self.on_failure(err),
            };
            let wake = match next {
                Next::After(delay) => self.wait_until(Instant::now() + delay).await,
                Next::Backoff(delay) => self.wait_with_countdown(Instant::now() + delay).await,
                Next::Idle => self.wait_for_retry().await,
            };
            match wake {
                Wake::Timer => {}
                Wake::Retry => self.reset_for_retry(),
                Wake::Shutdown => break,
            }
        }
        debug!(session_id = %self.snapshot.session_id, "Session poller stopped");
    }

    async fn fetch(&mut self) -> Option<Result<Session, PlatformError>> {
        self.snapshot.phase = PollerPhase::Fetching;
        self.snapshot.next_retry_in_secs = None;
        self.publish();

        let platform = self.platform.clone();
        let session_id = self.snapshot.session_id.clone();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = platform.get_session(&session_id) => Some(result),
        }
    }

    fn on_success(&mut self, session: Session) -> Next {
        // A fetched session exists even if the platform has not assigned a status yet.
        let raw_status = session
            .status_enum
            .clone()
            .unwrap_or_else(|| "pending".to_string());
        let status = derive(
            self.snapshot.kind,
            Some(raw_status.as_str()),
            session.structured_output.as_ref(),
            session.pull_request_url(),
        );
        let terminal = status.is_terminal;

        self.snapshot.failure_count = 0;
        self.snapshot.last_error = None;
        self.snapshot.last_success_at = Some(Utc::now());
        self.snapshot.status = Some(status);
        self.snapshot.data = Some(session);

        if terminal {
            self.snapshot.phase = PollerPhase::Stopped;
            self.publish();
            info!(
                session_id = %self.snapshot.session_id,
                status = %raw_status,
                "Session reached a terminal status, polling stopped"
            );
            Next::Idle
        } else {
            self.snapshot.phase = PollerPhase::Normal;
            self.publish();
            Next::After(self.config.interval)
        }
    }

    fn on_failure(&mut self, err: PlatformError) -> Next {
        let class = err.class();
        let status = err.status();
        self.snapshot.failure_count = self.snapshot.failure_count.saturating_add(1);
        let failures = self.snapshot.failure_count;

        if class == ErrorClass::Transient && failures < self.config.failure_threshold {
            let delay = self.config.backoff.next_delay(failures);
            warn!(
                session_id = %self.snapshot.session_id,
                failures,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Session fetch failed, backing off"
            );
            self.snapshot.last_error = Some(PollError {
                class,
                status,
                message: transient_message(&err),
            });
            self.snapshot.phase = PollerPhase::BackingOff;
            self.snapshot.next_retry_in_secs = Some(ceil_secs(delay));
            self.publish();
            return Next::Backoff(delay);
        }

        let message = match class {
            ErrorClass::Transient => exhausted_message(&err, failures),
            ErrorClass::Permanent => permanent_message(status),
        };
        warn!(
            session_id = %self.snapshot.session_id,
            failures,
            error = %err,
            "Session polling exhausted"
        );
        self.snapshot.last_error = Some(PollError {
            class,
            status,
            message,
        });
        self.snapshot.phase = PollerPhase::Exhausted;
        self.snapshot.next_retry_in_secs = None;
        self.publish();
        Next::Idle
    }

    fn reset_for_retry(&mut self) {
        info!(session_id = %self.snapshot.session_id, "Manual retry requested");
        self.snapshot.failure_count = 0;
        self.snapshot.last_error = None;
        self.snapshot.next_retry_in_secs = None;
    }

    async fn wait_until(&mut self, deadline: Instant) -> Wake {
        let due = sleep_until(deadline);
        tokio::pin!(due);
        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => WaitEvent::Cancelled,
            cmd = self.inbox.recv() => WaitEvent::Command(cmd),
            _ = &mut due => WaitEvent::Due,
        };
        Self::wake_for(event)
    }

    async fn wait_with_countdown(&mut self, deadline: Instant) -> Wake {
        let due = sleep_until(deadline);
        tokio::pin!(due);
        let mut countdown = interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => WaitEvent::Cancelled,
                cmd = self.inbox.recv() => WaitEvent::Command(cmd),
                _ = &mut due => WaitEvent::Due,
                _ = countdown.tick() => WaitEvent::Tick,
            };
            if let WaitEvent::Tick = event {
                let remaining = deadline.saturating_duration_since(Instant::now());
                self.snapshot.next_retry_in_secs = Some(ceil_secs(remaining));
                self.publish();
                continue;
            }
            return Self::wake_for(event);
        }
    }

    async fn wait_for_retry(&mut self) -> Wake {
        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => WaitEvent::Cancelled,
            cmd = self.inbox.recv() => WaitEvent::Command(cmd),
        };
        Self::wake_for(event)
    }

    fn wake_for(event: WaitEvent) -> Wake {
        match event {
            WaitEvent::Cancelled | WaitEvent::Command(None) => Wake::Shutdown,
            WaitEvent::Command(Some(PollerCommand::Retry)) => Wake::Retry,
            WaitEvent::Due | WaitEvent::Tick => Wake::Timer,
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot.clone());
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(1000) as u64
}

fn transient_message(err: &PlatformError) -> String {
    match err {
        PlatformError::Http { status: 429, .. } => {
            "Agent platform is rate limiting requests.".to_string()
        }
        PlatformError::Http { status, .. } => {
            format!("Agent platform temporarily unavailable (HTTP {}).", status)
        }
        PlatformError::Decode(_) => "Agent platform sent an unreadable response.".to_string(),
        PlatformError::Network(_) => "Agent platform unreachable.".to_string(),
    }
}

fn exhausted_message(err: &PlatformError, failures: u32) -> String {
    match err {
        PlatformError::Decode(_) => format!(
            "Agent platform sent an unreadable response {} times in a row.",
            failures
        ),
        _ => format!("Agent platform unreachable after {} attempts.", failures),
    }
}

fn permanent_message(status: Option<u16>) -> String {
    match status {
        Some(404) => "Session not found on the agent platform.".to_string(),
        Some(code) => format!("Agent platform rejected the request (HTTP {}).", code),
        None => "Agent platform rejected the request.".to_string(),
    }
}

#[cfg(test)]
mod tests;
