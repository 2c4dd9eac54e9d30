//! Git executor: rebase and force-push PR branches in a local working copy
//!
//! All git mutation in the crate goes through [`GitExecutor`]. The merge
//! queue calls it from its single-flight slot, so at most one rebase or push
//! runs at a time.

use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

/// Remote the working copies track
const REMOTE: &str = "origin";

/// HTTPS credentials scoped to the repository host
#[derive(Clone)]
pub struct GitCredentials {
    /// Basic-auth user name (GitHub accepts `x-access-token` for tokens)
    pub username: String,
    /// Token or password
    pub token: String,
}

impl GitCredentials {
    /// Credentials for a GitHub token
    pub fn github_token(token: impl Into<String>) -> Self {
        Self {
            username: "x-access-token".to_string(),
            token: token.into(),
        }
    }

    /// No credentials; git falls back to whatever the working copy has
    pub const fn anonymous() -> Self {
        Self {
            username: String::new(),
            token: String::new(),
        }
    }

    /// `http.extraHeader` value carrying these credentials
    fn auth_header(&self) -> Option<String> {
        if self.token.is_empty() {
            return None;
        }
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.token));
        Some(format!("AUTHORIZATION: basic {encoded}"))
    }
}

impl fmt::Debug for GitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitCredentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Outcome of a rebase attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// Branch now sits on top of the base
    Rebased,
    /// Rebase stopped; the working copy was restored
    Conflict(String),
}

/// Git operations needed by the merge queue
#[async_trait]
pub trait GitExecutor: Send + Sync {
    /// Rebase `branch` onto the remote `base` inside `repo_path`
    async fn rebase_branch(
        &self,
        repo_path: &Path,
        branch: &str,
        base: &str,
        credentials: &GitCredentials,
    ) -> Result<RebaseOutcome>;

    /// Force-push `branch` to the remote
    async fn force_push_branch(
        &self,
        repo_path: &Path,
        branch: &str,
        credentials: &GitCredentials,
    ) -> Result<()>;
}

/// [`GitExecutor`] backed by the `git` binary
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    /// Create a new executor
    pub const fn new() -> Self {
        Self
    }

    async fn run(
        repo_path: &Path,
        args: &[&str],
        credentials: Option<&GitCredentials>,
    ) -> Result<std::process::Output> {
        let mut cmd = Command::new("git");
        if let Some(header) = credentials.and_then(GitCredentials::auth_header) {
            cmd.arg("-c").arg(format!("http.extraHeader={header}"));
        }
        cmd.arg("-C").arg(repo_path).args(args);
        // Never block on an interactive credential prompt
        cmd.env("GIT_TERMINAL_PROMPT", "0");

        debug!(path = %repo_path.display(), ?args, "running git");
        cmd.output()
            .await
            .map_err(|e| Error::Git(format!("failed to run git {}: {e}", args.join(" "))))
    }

    async fn run_checked(
        repo_path: &Path,
        args: &[&str],
        credentials: Option<&GitCredentials>,
    ) -> Result<()> {
        let output = Self::run(repo_path, args, credentials).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GitExecutor for GitCli {
    async fn rebase_branch(
        &self,
        repo_path: &Path,
        branch: &str,
        base: &str,
        credentials: &GitCredentials,
    ) -> Result<RebaseOutcome> {
        Self::run_checked(repo_path, &["fetch", REMOTE, base, branch], Some(credentials)).await?;

        let remote_branch = format!("{REMOTE}/{branch}");
        Self::run_checked(
            repo_path,
            &["checkout", "--force", "-B", branch, &remote_branch],
            None,
        )
        .await?;

        let remote_base = format!("{REMOTE}/{base}");
        let output = Self::run(repo_path, &["rebase", &remote_base], None).await?;
        if output.status.success() {
            debug!(branch, base, "rebase succeeded");
            return Ok(RebaseOutcome::Rebased);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if let Err(e) = Self::run_checked(repo_path, &["rebase", "--abort"], None).await {
            warn!(branch, error = %e, "failed to abort rebase");
        }

        let detail = if stderr.is_empty() { stdout } else { stderr };
        Ok(RebaseOutcome::Conflict(detail))
    }

    async fn force_push_branch(
        &self,
        repo_path: &Path,
        branch: &str,
        credentials: &GitCredentials,
    ) -> Result<()> {
        let refspec = format!("{branch}:{branch}");
        Self::run_checked(
            repo_path,
            &["push", "--force-with-lease", REMOTE, &refspec],
            Some(credentials),
        )
        .await
    }
}
