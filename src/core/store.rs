use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::workflow::SessionKind;

pub const DB_FILE: &str = "sessions.db";

/// Which agent session was started for which issue.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub repository: String,
    pub issue_number: u64,
    pub kind: SessionKind,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

pub struct SessionStore {
    db: Arc<Mutex<Connection>>,
}

impl SessionStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Open `<data_dir>/sessions.db` and make sure the schema exists.
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let path = data_dir.as_ref().join(DB_FILE);
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open session store at {}", path.display()))?;
        let store = Self::new(Arc::new(Mutex::new(conn)));
        store.initialize().await?;
        Ok(store)
    }

    pub async fn initialize(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "CREATE TABLE IF NOT EXISTS issue_sessions (
                repository TEXT NOT NULL,
                issue_number INTEGER NOT NULL,
                kind TEXT NOT NULL,
                session_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (repository, issue_number, kind)
            )",
            [],
        )?;
        Ok(())
    }

    /// Remember `session_id` for the issue, replacing an earlier session of the same kind.
    pub async fn record(
        &self,
        repository: &str,
        issue_number: u64,
        kind: SessionKind,
        session_id: &str,
    ) -> Result<SessionRecord> {
        let number = sql_issue_number(issue_number)?;
        let record = SessionRecord {
            repository: repository.to_string(),
            issue_number,
            kind,
            session_id: session_id.to_string(),
            created_at: Utc::now(),
        };
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO issue_sessions (repository, issue_number, kind, session_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(repository, issue_number, kind) DO UPDATE SET
                session_id=excluded.session_id,
                created_at=excluded.created_at",
            (
                &record.repository,
                number,
                kind.as_str(),
                &record.session_id,
                record.created_at.to_rfc3339(),
            ),
        )?;
        info!(
            repository,
            issue_number,
            kind = kind.as_str(),
            session_id,
            "Recorded agent session"
        );
        Ok(record)
    }

    pub async fn get(
        &self,
        repository: &str,
        issue_number: u64,
        kind: SessionKind,
    ) -> Result<Option<SessionRecord>> {
        let number = sql_issue_number(issue_number)?;
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT repository, issue_number, kind, session_id, created_at
             FROM issue_sessions WHERE repository = ?1 AND issue_number = ?2 AND kind = ?3",
        )?;
        let mut rows = stmt.query((repository, number, kind.as_str()))?;
        let record = match rows.next()? {
            Some(row) => read_record(row)?,
            None => None,
        };
        Ok(record)
    }

    /// Sessions of one issue, scope before execute.
    pub async fn for_issue(&self, repository: &str, issue_number: u64) -> Result<Vec<SessionRecord>> {
        let number = sql_issue_number(issue_number)?;
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT repository, issue_number, kind, session_id, created_at
             FROM issue_sessions WHERE repository = ?1 AND issue_number = ?2",
        )?;
        let mut rows = stmt.query((repository, number))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(record) = read_record(row)? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| kind_order(r.kind));
        Ok(records)
    }

    /// Every session recorded for the repository, ordered by issue number.
    pub async fn list(&self, repository: &str) -> Result<Vec<SessionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT repository, issue_number, kind, session_id, created_at
             FROM issue_sessions WHERE repository = ?1 ORDER BY issue_number",
        )?;
        let mut rows = stmt.query([repository])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(record) = read_record(row)? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| (r.issue_number, kind_order(r.kind)));
        Ok(records)
    }

    /// Drop both sessions of an issue. Returns how many rows went away.
    pub async fn forget_issue(&self, repository: &str, issue_number: u64) -> Result<usize> {
        let number = sql_issue_number(issue_number)?;
        let db = self.db.lock().await;
        let removed = db.execute(
            "DELETE FROM issue_sessions WHERE repository = ?1 AND issue_number = ?2",
            (repository, number),
        )?;
        Ok(removed)
    }
}

/// SQLite integers are signed; numbers past `i64::MAX` are refused instead of wrapping.
fn sql_issue_number(issue_number: u64) -> Result<i64> {
    i64::try_from(issue_number)
        .with_context(|| format!("Issue number {} is too large to store", issue_number))
}

fn kind_order(kind: SessionKind) -> u8 {
    match kind {
        SessionKind::Scope => 0,
        SessionKind::Execute => 1,
    }
}

/// Rows with an unknown kind or unreadable timestamp are skipped, not fatal.
fn read_record(row: &Row<'_>) -> rusqlite::Result<Option<SessionRecord>> {
    let repository: String = row.get(0)?;
    let issue_number: i64 = row.get(1)?;
    let kind: String = row.get(2)?;
    let session_id: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    let Ok(number) = u64::try_from(issue_number) else {
        warn!(repository = %repository, issue_number, "Skipping session row with negative issue number");
        return Ok(None);
    };

    let Some(kind) = SessionKind::parse(&kind) else {
        warn!(repository = %repository, issue_number, kind = %kind, "Skipping session row with unknown kind");
        return Ok(None);
    };
    let created_at = match DateTime::parse_from_rfc3339(&created_at) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => {
            warn!(
                repository = %repository,
                issue_number,
                created_at = %created_at,
                "Skipping session row with bad timestamp"
            );
            return Ok(None);
        }
    };

    Ok(Some(SessionRecord {
        repository,
        issue_number: number,
        kind,
        session_id,
        created_at,
    }))
}
