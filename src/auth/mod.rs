//! Authentication for the repository host
//!
//! Supports environment variables and CLI-based auth (gh).

mod github;

pub use github::{GitHubAuthConfig, get_github_auth};

/// Source of authentication token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Token from CLI tool (gh)
    Cli,
    /// Token from environment variable
    EnvVar,
}

impl std::fmt::Display for AuthSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "gh CLI"),
            Self::EnvVar => write!(f, "environment"),
        }
    }
}
