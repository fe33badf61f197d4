use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::agent_platform::{HttpSessionPlatform, SessionPlatform};
use crate::core::config::AppConfig;
use crate::core::github::GithubIssueSource;
use crate::core::store::SessionStore;
use crate::platform::{NativePlatform, Platform};

/// Everything a command needs: configuration, the session store and clients.
pub(crate) struct AppContext {
    pub config: AppConfig,
    pub store: SessionStore,
}

impl AppContext {
    pub(crate) async fn load(data_dir: &Path) -> Result<Self> {
        let config = AppConfig::load(data_dir).await?;
        let store = SessionStore::open(data_dir).await?;
        NativePlatform::restrict_file_permissions(&data_dir.join(crate::core::store::DB_FILE));
        Ok(Self { config, store })
    }

    pub(crate) fn repository(&self) -> Result<String> {
        self.config.repository()
    }

    pub(crate) fn issue_source(&self) -> Result<GithubIssueSource> {
        self.config.repository()?;
        Ok(GithubIssueSource::new(
            self.config.github.api_base.clone(),
            self.config.github.owner.trim(),
            self.config.github.repo.trim(),
            self.config.github.token.clone(),
        ))
    }

    pub(crate) fn platform(&self) -> Result<Arc<dyn SessionPlatform>> {
        let api_key = self
            .config
            .platform_api_key()
            .context("Cannot reach the agent platform")?;
        Ok(Arc::new(HttpSessionPlatform::new(
            self.config.platform.api_base.clone(),
            api_key,
        )))
    }
}
