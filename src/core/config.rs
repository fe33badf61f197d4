use anyhow::{Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::core::agent_platform::{CreateSessionRequest, DEFAULT_API_BASE};
use crate::core::backoff::BackoffPolicy;
use crate::core::poller::PollerConfig;

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GithubConfig {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_github_api")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_api")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Tags attached to every session this tool creates.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub unlisted: Option<bool>,
    #[serde(default)]
    pub secret_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

fn default_github_api() -> String {
    DEFAULT_GITHUB_API.to_string()
}
fn default_platform_api() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_interval_ms() -> u64 {
    15_000
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    2_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_backoff_cap_ms() -> u64 {
    60_000
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            token: None,
            api_base: default_github_api(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: default_platform_api(),
            api_key: None,
            tags: Vec::new(),
            unlisted: None,
            secret_ids: Vec::new(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            failure_threshold: default_failure_threshold(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl AppConfig {
    /// Read `<data_dir>/config.toml`, apply environment overrides and validate.
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let mut config = Self::load_file(data_dir).await?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    async fn load_file<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);
        if !config_path.exists() {
            info!("No config.toml found, using defaults.");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&config_path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        info!(
            "Loaded config: repo={}/{}, platform={}, interval={}ms",
            config.github.owner,
            config.github.repo,
            config.platform.api_base,
            config.polling.interval_ms
        );
        Ok(config)
    }

    /// Overlay `GITHUB_TOKEN`, `ISSUE_PILOT_REPO`, `AGENT_PLATFORM_API_KEY`
    /// and `AGENT_PLATFORM_API_BASE`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(repo) = var("ISSUE_PILOT_REPO")
            && let Some((owner, name)) = repo.trim().split_once('/')
        {
            self.github.owner = owner.to_string();
            self.github.repo = name.to_string();
        }
        if let Some(key) = var("AGENT_PLATFORM_API_KEY") {
            self.platform.api_key = Some(key);
        }
        if let Some(base) = var("AGENT_PLATFORM_API_BASE") {
            self.platform.api_base = base;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let polling = &self.polling;
        if polling.interval_ms == 0 {
            bail!("polling.interval_ms must be greater than zero");
        }
        if polling.failure_threshold == 0 {
            bail!("polling.failure_threshold must be at least 1");
        }
        if polling.backoff_base_ms == 0 {
            bail!("polling.backoff_base_ms must be greater than zero");
        }
        if !polling.backoff_multiplier.is_finite() || polling.backoff_multiplier < 1.0 {
            bail!(
                "polling.backoff_multiplier must be at least 1 (got {})",
                polling.backoff_multiplier
            );
        }
        if polling.backoff_cap_ms < polling.backoff_base_ms {
            bail!(
                "polling.backoff_cap_ms ({}) is below polling.backoff_base_ms ({})",
                polling.backoff_cap_ms,
                polling.backoff_base_ms
            );
        }
        Ok(())
    }

    /// `owner/name`, or an error telling the operator how to set it.
    pub fn repository(&self) -> Result<String> {
        let owner = self.github.owner.trim();
        let repo = self.github.repo.trim();
        if owner.is_empty() || repo.is_empty() {
            bail!(
                "No repository configured. Set [github] owner/repo in {} or ISSUE_PILOT_REPO=owner/name",
                CONFIG_FILE
            );
        }
        Ok(format!("{}/{}", owner, repo))
    }

    pub fn platform_api_key(&self) -> Result<String> {
        match self.platform.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => bail!(
                "No agent platform API key. Set [platform] api_key in {} or AGENT_PLATFORM_API_KEY",
                CONFIG_FILE
            ),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.polling.interval_ms),
            failure_threshold: self.polling.failure_threshold,
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.polling.backoff_base_ms),
                multiplier: self.polling.backoff_multiplier,
                cap: Duration::from_millis(self.polling.backoff_cap_ms),
            },
        }
    }

    /// Session creation options shared by scope and execute runs.
    pub fn session_request(&self, prompt: String, title: String) -> CreateSessionRequest {
        CreateSessionRequest {
            prompt,
            tags: self.platform.tags.clone(),
            title: Some(title),
            unlisted: self.platform.unlisted,
            secret_ids: self.platform.secret_ids.clone(),
        }
    }
}
