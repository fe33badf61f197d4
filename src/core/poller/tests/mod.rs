
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::core::agent_platform::{
    CreateSessionRequest, PlatformError, PullRequestRef, Session, SessionPlatform,
};
use crate::core::backoff::BackoffPolicy;
use crate::core::poller::{PollerConfig, PollerSnapshot};

type Reply = Result<Session, PlatformError>;

/// Replays queued replies, then repeats `fallback` forever.
pub(super) struct ScriptedPlatform {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    latency: Duration,
    calls: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedPlatform {
    pub(super) fn new(replies: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(super) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(super) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(super) fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    /// Gaps between consecutive fetches.
    pub(super) fn gaps(&self) -> Vec<Duration> {
        self.call_times()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    pub(super) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionPlatform for ScriptedPlatform {
    async fn create_session(
        &self,
        _request: &CreateSessionRequest,
    ) -> Result<Session, PlatformError> {
        Err(PlatformError::Http {
            status: 405,
            body: "not scripted".into(),
        })
    }

    async fn get_session(&self, _session_id: &str) -> Result<Session, PlatformError> {
        self.calls.lock().unwrap().push(Instant::now());
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

pub(super) fn session(status: &str, output: Option<Value>) -> Session {
    Session {
        session_id: "abc".into(),
        url: Some("https://app.example.dev/sessions/abc".into()),
        title: None,
        status_enum: Some(status.into()),
        structured_output: output,
        pull_request: None,
        updated_at: Some("2026-03-01T10:15:00Z".into()),
    }
}

pub(super) fn running() -> Reply {
    Ok(session("running", None))
}

pub(super) fn finished_scope() -> Reply {
    Ok(session(
        "finished",
        Some(json!({ "confidence_score": 72, "summary": "Tighten input validation" })),
    ))
}

pub(super) fn finished_with_pr() -> Reply {
    let mut s = session("finished", Some(json!({ "progress_percentage": 100 })));
    s.pull_request = Some(PullRequestRef {
        url: "https://github.com/acme/widgets/pull/9".into(),
    });
    Ok(s)
}

pub(super) fn http(status: u16) -> Reply {
    Err(PlatformError::Http {
        status,
        body: format!("status {}", status),
    })
}

pub(super) fn network() -> Reply {
    Err(PlatformError::Network("connection reset by peer".into()))
}

pub(super) fn garbled() -> Reply {
    Err(PlatformError::Decode("expected value at line 1 column 1".into()))
}

pub(super) fn config() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_secs(15),
        failure_threshold: 5,
        backoff: BackoffPolicy::default(),
    }
}

pub(super) async fn wait_for(
    rx: &mut watch::Receiver<PollerSnapshot>,
    predicate: impl FnMut(&PollerSnapshot) -> bool,
) -> PollerSnapshot {
    rx.wait_for(predicate)
        .await
        .expect("poller dropped its snapshot channel")
        .clone()
}

/// Let the paused clock run far past any timer the poller could hold.
pub(super) async fn idle_for_a_long_time() {
    tokio::time::sleep(Duration::from_secs(3_600)).await;
}
