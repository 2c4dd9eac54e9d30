//! Error types for pr-shepherd

use thiserror::Error;

/// Errors produced by the merge queue, the review monitor and their collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// GitHub API request failed
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// The host refused to merge (conflicts, failing requirements, stale head)
    #[error("pull request is not mergeable: {0}")]
    NotMergeable(String),

    /// A git command failed
    #[error("git error: {0}")]
    Git(String),

    /// Reading or writing persisted state failed
    #[error("store error: {0}")]
    Store(String),

    /// Configuration could not be loaded or is invalid
    #[error("config error: {0}")]
    Config(String),

    /// No usable credentials were found
    #[error("authentication error: {0}")]
    Auth(String),

    /// Task does not exist in the task store
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Project does not exist in the task store
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// Merge queue entry does not exist
    #[error("queue entry not found: {0}")]
    EntryNotFound(String),

    /// The review pipeline rejected a request
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// An event could not be delivered
    #[error("notification error: {0}")]
    Notify(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error signals that the host will not merge this PR as-is.
    ///
    /// Matches the dedicated variant as well as API errors whose message
    /// mentions a conflict or an unmergeable state.
    pub fn is_not_mergeable(&self) -> bool {
        match self {
            Self::NotMergeable(_) => true,
            Self::GitHubApi(msg) => mentions_unmergeable(msg),
            _ => false,
        }
    }
}

fn mentions_unmergeable(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("not mergeable") || lower.contains("conflict")
}

impl From<octocrab::Error> for Error {
    fn from(err: octocrab::Error) -> Self {
        if let octocrab::Error::GitHub { source, .. } = &err {
            // 405: merge not allowed, 409: head moved or conflicting
            let status = source.status_code.as_u16();
            if status == 405 || status == 409 || mentions_unmergeable(&source.message) {
                return Self::NotMergeable(source.message.clone());
            }
            return Self::GitHubApi(source.message.clone());
        }
        Self::GitHubApi(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
