mod http;
mod types;

use async_trait::async_trait;

pub use http::{DEFAULT_API_BASE, HttpSessionPlatform};
pub use types::{CreateSessionRequest, PullRequestRef, Session};

/// How the poller should react to a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Expected to clear on its own: rate limiting, gateway trouble, no response.
    Transient,
    /// Retrying will not help: not found, rejected, unauthorized.
    Permanent,
}

/// Classify a failure by its HTTP status. `None` means no response arrived.
pub fn classify_status(status: Option<u16>) -> ErrorClass {
    match status {
        None => ErrorClass::Transient,
        Some(429 | 502 | 503 | 504) => ErrorClass::Transient,
        Some(_) => ErrorClass::Permanent,
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("agent platform returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("agent platform unreachable: {0}")]
    Network(String),
    /// A 2xx response whose envelope is not valid session JSON.
    #[error("agent platform sent an unreadable response: {0}")]
    Decode(String),
}

impl PlatformError {
    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::Http { status, .. } => Some(*status),
            PlatformError::Network(_) | PlatformError::Decode(_) => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        classify_status(self.status())
    }
}

/// Remote agent platform that runs scope and execute sessions.
#[async_trait]
pub trait SessionPlatform: Send + Sync {
    async fn create_session(&self, request: &CreateSessionRequest)
    -> Result<Session, PlatformError>;

    async fn get_session(&self, session_id: &str) -> Result<Session, PlatformError>;
}
