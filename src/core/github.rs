use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const USER_AGENT: &str = concat!("issue-pilot/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    pub state: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Present only when the "issue" is really a pull request.
    #[serde(default)]
    pull_request: Option<Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Open,
    Closed,
    All,
}

impl IssueState {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(IssueState::Open),
            "closed" => Some(IssueState::Closed),
            "all" => Some(IssueState::All),
            _ => None,
        }
    }
}

/// Non-2xx answer from the GitHub API.
#[derive(Debug, thiserror::Error)]
#[error("GitHub API returned HTTP {status}: {message}")]
pub struct GithubStatusError {
    pub status: u16,
    pub message: String,
}

#[async_trait]
pub trait IssueSource: Send + Sync {
    async fn list_issues(&self, state: IssueState) -> Result<Vec<Issue>>;
    async fn get_issue(&self, number: u64) -> Result<Issue>;
}

pub struct GithubIssueSource {
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
    client: Client,
}

impl GithubIssueSource {
    pub fn new(
        api_base: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.filter(|t| !t.trim().is_empty()),
            client: Client::new(),
        }
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/{}/issues", self.api_base, self.owner, self.repo)
    }

    fn issue_url(&self, number: u64) -> String {
        format!("{}/{}", self.issues_url(), number)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(res: Response) -> Result<Response> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        Err(GithubStatusError {
            status: status.as_u16(),
            message,
        }
        .into())
    }
}

#[async_trait]
impl IssueSource for GithubIssueSource {
    async fn list_issues(&self, state: IssueState) -> Result<Vec<Issue>> {
        debug!(owner = %self.owner, repo = %self.repo, state = state.as_str(), "Listing issues");
        let res = self
            .authorize(self.client.get(self.issues_url()))
            .query(&[("state", state.as_str()), ("per_page", "100")])
            .send()
            .await?;
        let issues: Vec<Issue> = Self::check(res).await?.json().await?;
        Ok(without_pull_requests(issues))
    }

    async fn get_issue(&self, number: u64) -> Result<Issue> {
        let res = self
            .authorize(self.client.get(self.issue_url(number)))
            .send()
            .await?;
        let issue: Issue = Self::check(res).await?.json().await?;
        if issue.is_pull_request() {
            bail!("#{} is a pull request, not an issue", number);
        }
        Ok(issue)
    }
}

fn without_pull_requests(issues: Vec<Issue>) -> Vec<Issue> {
    issues.into_iter().filter(|i| !i.is_pull_request()).collect()
}
