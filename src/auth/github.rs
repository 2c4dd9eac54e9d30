//! GitHub token resolution

use super::AuthSource;
use crate::error::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Environment variables checked for a token, in order
const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Resolved GitHub credentials
#[derive(Debug, Clone)]
pub struct GitHubAuthConfig {
    /// API token, also used for git over HTTPS
    pub token: String,
    /// Where the token came from
    pub source: AuthSource,
    /// GitHub Enterprise host, if any
    pub host: Option<String>,
}

/// Resolve a GitHub token from the environment, falling back to `gh auth token`
pub async fn get_github_auth(host: Option<&str>) -> Result<GitHubAuthConfig> {
    if let Some(token) = token_from_env(|key| std::env::var(key).ok()) {
        debug!("using GitHub token from environment");
        return Ok(GitHubAuthConfig {
            token,
            source: AuthSource::EnvVar,
            host: host.map(String::from),
        });
    }

    let mut cmd = Command::new("gh");
    cmd.args(["auth", "token"]);
    if let Some(h) = host {
        cmd.args(["--hostname", h]);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| Error::Auth(format!("no token in environment and gh not runnable: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Auth(format!(
            "no token in environment and `gh auth token` failed: {}",
            stderr.trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(Error::Auth("`gh auth token` returned an empty token".to_string()));
    }

    debug!("using GitHub token from gh CLI");
    Ok(GitHubAuthConfig {
        token,
        source: AuthSource::Cli,
        host: host.map(String::from),
    })
}

fn token_from_env(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    TOKEN_ENV_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}
