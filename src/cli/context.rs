//! Shared command context for CLI commands
//!
//! Loading config and opening the state file is cheap and offline.
//! Resolving credentials and building the host client only happens for
//! commands that need them.

use pr_shepherd::auth::get_github_auth;
use pr_shepherd::config::Config;
use pr_shepherd::error::Result;
use pr_shepherd::events::{EventSink, NullSink, WebhookSink};
use pr_shepherd::git::{GitCli, GitCredentials};
use pr_shepherd::platform::GitHubService;
use pr_shepherd::services::Services;
use pr_shepherd::store::LocalStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by every command
pub struct CommandContext {
    /// Loaded configuration
    pub config: Config,
    /// Task store, queue table and outbox
    pub store: Arc<LocalStore>,
}

/// Collaborators wired for one command
pub struct Connected {
    /// Service bundle for the schedulers
    pub services: Services,
    /// Credentials for git pushes
    pub credentials: GitCredentials,
}

impl CommandContext {
    /// Load config and open the state file
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path)?;
        let state_path = config.state_path()?;
        let store = Arc::new(LocalStore::open(&state_path)?);
        debug!(path = %state_path.display(), "state file opened");
        Ok(Self { config, store })
    }

    /// Resolve credentials and wire the host client, git and event sinks
    pub async fn connect(&self) -> Result<Connected> {
        let host = self.config.github.host.as_deref();
        let auth = get_github_auth(host).await?;
        info!(source = %auth.source, "authenticated with GitHub");

        let platform = Arc::new(GitHubService::new(&auth.token, host)?);
        Ok(Connected {
            services: self.services(platform)?,
            credentials: GitCredentials::github_token(auth.token),
        })
    }

    /// Wiring for commands that only touch the store and the event sinks
    ///
    /// No credentials are resolved, so queue management works without a
    /// GitHub token.
    pub fn local(&self) -> Result<Connected> {
        let platform = Arc::new(GitHubService::anonymous(
            self.config.github.host.as_deref(),
        )?);
        Ok(Connected {
            services: self.services(platform)?,
            credentials: GitCredentials::anonymous(),
        })
    }

    fn services(&self, platform: Arc<GitHubService>) -> Result<Services> {
        Ok(Services::new(
            self.store.clone(),
            self.store.clone(),
            platform,
            Arc::new(GitCli::new()),
            self.store.clone(),
        )
        .with_events(self.event_sink()?))
    }

    fn event_sink(&self) -> Result<Arc<dyn EventSink>> {
        match &self.config.notify.webhook_url {
            Some(url) => Ok(Arc::new(WebhookSink::new(url.clone())?)),
            None => Ok(Arc::new(NullSink)),
        }
    }
}
