//! Pollers for a set of issues, grouped per issue.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info;

use crate::core::agent_platform::SessionPlatform;
use crate::core::aggregator::{IssueSessionSummary, summarize};
use crate::core::poller::{PollerConfig, PollerHandle, PollerPhase, PollerSnapshot};
use crate::core::store::SessionRecord;
use crate::core::workflow::SessionKind;

/// The scope and execute pollers of one issue.
pub struct IssueWatch {
    issue_number: u64,
    platform: Arc<dyn SessionPlatform>,
    config: PollerConfig,
    changes: Arc<Notify>,
    scope: Option<PollerHandle>,
    execute: Option<PollerHandle>,
}

impl IssueWatch {
    /// `changes` is notified whenever any poller of this issue publishes.
    pub fn new(
        issue_number: u64,
        platform: Arc<dyn SessionPlatform>,
        config: PollerConfig,
        changes: Arc<Notify>,
    ) -> Self {
        Self {
            issue_number,
            platform,
            config,
            changes,
            scope: None,
            execute: None,
        }
    }

    pub fn issue_number(&self) -> u64 {
        self.issue_number
    }

    /// Poll `session_id` as this issue's `kind` session. Any previous poller of
    /// that kind is disposed first; attaching the same id again does nothing.
    pub async fn attach(&mut self, kind: SessionKind, session_id: &str) {
        let slot = match kind {
            SessionKind::Scope => &mut self.scope,
            SessionKind::Execute => &mut self.execute,
        };
        if slot.as_ref().is_some_and(|h| h.session_id() == session_id) {
            return;
        }
        if let Some(old) = slot.take() {
            info!(
                issue = self.issue_number,
                kind = kind.as_str(),
                old = old.session_id(),
                new = session_id,
                "Replacing session poller"
            );
            old.dispose().await;
        }

        let handle = PollerHandle::spawn(self.platform.clone(), session_id, kind, self.config);
        forward_changes(&handle, self.changes.clone());
        *slot = Some(handle);
    }

    pub fn poller(&self, kind: SessionKind) -> Option<&PollerHandle> {
        match kind {
            SessionKind::Scope => self.scope.as_ref(),
            SessionKind::Execute => self.execute.as_ref(),
        }
    }

    pub fn snapshot(&self, kind: SessionKind) -> Option<PollerSnapshot> {
        self.poller(kind).map(PollerHandle::snapshot)
    }

    pub fn summary(&self) -> Option<IssueSessionSummary> {
        let scope = self.snapshot(SessionKind::Scope);
        let execute = self.snapshot(SessionKind::Execute);
        summarize(scope.as_ref(), execute.as_ref())
    }

    /// Retry every exhausted poller. Returns how many were retried.
    pub fn retry_stalled(&self) -> usize {
        self.pollers()
            .filter(|h| h.snapshot().is_exhausted())
            .inspect(|h| h.retry())
            .count()
    }

    /// Every poller has stopped on its own: terminal status or exhausted.
    pub fn is_settled(&self) -> bool {
        self.pollers().all(|h| {
            matches!(
                h.snapshot().phase,
                PollerPhase::Stopped | PollerPhase::Exhausted
            )
        })
    }

    /// Every poller has finished at least one fetch, successful or not.
    pub fn has_reported(&self) -> bool {
        self.pollers().all(|h| {
            !matches!(
                h.snapshot().phase,
                PollerPhase::Idle | PollerPhase::Fetching
            )
        })
    }

    pub async fn dispose(mut self) {
        for handle in [self.scope.take(), self.execute.take()].into_iter().flatten() {
            handle.dispose().await;
        }
    }

    fn pollers(&self) -> impl Iterator<Item = &PollerHandle> {
        self.scope.iter().chain(self.execute.iter())
    }
}

/// Wake `changes` on every snapshot. Ends when the poller task does.
fn forward_changes(handle: &PollerHandle, changes: Arc<Notify>) {
    let mut rx = handle.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            changes.notify_one();
        }
    });
}

/// Every watched issue of one repository.
pub struct Dashboard {
    repository: String,
    platform: Arc<dyn SessionPlatform>,
    config: PollerConfig,
    changes: Arc<Notify>,
    watches: BTreeMap<u64, IssueWatch>,
}

impl Dashboard {
    pub fn new(
        repository: impl Into<String>,
        platform: Arc<dyn SessionPlatform>,
        config: PollerConfig,
    ) -> Self {
        Self {
            repository: repository.into(),
            platform,
            config,
            changes: Arc::new(Notify::new()),
            watches: BTreeMap::new(),
        }
    }

    /// Start pollers for the recorded sessions of this repository.
    pub async fn from_records(
        repository: impl Into<String>,
        platform: Arc<dyn SessionPlatform>,
        config: PollerConfig,
        records: &[SessionRecord],
    ) -> Self {
        let repository = repository.into();
        let mut dashboard = Self::new(repository.clone(), platform, config);
        for record in records.iter().filter(|r| r.repository == repository) {
            dashboard
                .attach(record.issue_number, record.kind, &record.session_id)
                .await;
        }
        dashboard
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub async fn attach(&mut self, issue_number: u64, kind: SessionKind, session_id: &str) {
        let watch = self.watches.entry(issue_number).or_insert_with(|| {
            IssueWatch::new(
                issue_number,
                self.platform.clone(),
                self.config,
                self.changes.clone(),
            )
        });
        watch.attach(kind, session_id).await;
    }

    pub fn watch(&self, issue_number: u64) -> Option<&IssueWatch> {
        self.watches.get(&issue_number)
    }

    pub fn issue_numbers(&self) -> Vec<u64> {
        self.watches.keys().copied().collect()
    }

    /// Summaries in issue-number order.
    pub fn summaries(&self) -> Vec<(u64, IssueSessionSummary)> {
        self.watches
            .iter()
            .filter_map(|(number, watch)| watch.summary().map(|s| (*number, s)))
            .collect()
    }

    pub fn retry_stalled(&self) -> usize {
        self.watches.values().map(IssueWatch::retry_stalled).sum()
    }

    pub fn is_settled(&self) -> bool {
        self.watches.values().all(IssueWatch::is_settled)
    }

    pub fn has_reported(&self) -> bool {
        self.watches.values().all(IssueWatch::has_reported)
    }

    /// Resolves after the next snapshot published by any poller.
    pub async fn changed(&self) {
        self.changes.notified().await;
    }

    pub async fn dispose(self) {
        for (_, watch) in self.watches {
            watch.dispose().await;
        }
    }
}
