//! Core types for pr-shepherd

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Kanban types (owned by the task board, partially mutated here)
// =============================================================================

/// Lifecycle column of a kanban task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskColumn {
    /// Not yet triaged
    Triage,
    /// Waiting to be picked up
    Backlog,
    /// Being implemented
    InProgress,
    /// PR open and awaiting review
    InReview,
    /// Finished (successfully or not, see the completion report)
    Done,
}

impl fmt::Display for TaskColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triage => write!(f, "triage"),
            Self::Backlog => write!(f, "backlog"),
            Self::InProgress => write!(f, "in_progress"),
            Self::InReview => write!(f, "in_review"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A kanban task, restricted to the fields this crate reads or writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task id
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// Short title (used for merge commit titles)
    pub title: String,
    /// Long description; review feedback is embedded here
    #[serde(default)]
    pub description: String,
    /// Lifecycle column
    pub column: TaskColumn,
    /// Pull request number, once one is open
    pub pr_number: Option<u64>,
    /// Pull request head branch
    pub pr_branch: Option<String>,
    /// Agent currently assigned to the task
    pub assignee_agent_id: Option<String>,
    /// Free-text outcome written when the task reaches `done`
    pub completion_report: Option<String>,
    /// Number of review cycles consumed so far
    #[serde(default)]
    pub pipeline_attempt: u32,
    /// Number of times the task was sent back to the backlog
    #[serde(default)]
    pub retry_count: u32,
    /// Id of the most recently actioned "changes requested" review
    pub review_watermark: Option<u64>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// A project on the board, with the repository it delivers into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project id
    pub id: String,
    /// Hosted repository
    pub repo: RepoSlug,
    /// Local working copy used for rebases
    pub repo_path: std::path::PathBuf,
    /// Configured integration branch (`main` when unset)
    pub branch: Option<String>,
    /// Agent that receives fix directives for this project
    pub delegate_agent_id: Option<String>,
}

impl Project {
    /// Default integration branch when a project does not configure one
    pub const DEFAULT_BRANCH: &'static str = "main";

    /// Branch pull requests are rebased onto and merged into
    pub fn base_branch(&self) -> &str {
        self.branch
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(Self::DEFAULT_BRANCH)
    }
}

/// Repository identifier on the host ("owner/name")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoSlug {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl RepoSlug {
    /// Create a slug from owner and name
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl TryFrom<String> for RepoSlug {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for RepoSlug {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(".git");
        match trimmed.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(format!("invalid repository '{s}', expected owner/name")),
        }
    }
}

impl From<RepoSlug> for String {
    fn from(slug: RepoSlug) -> Self {
        slug.to_string()
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// =============================================================================
// Merge queue types
// =============================================================================

/// Status of a merge queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for its turn
    Queued,
    /// Branch is being rebased and pushed
    Rebasing,
    /// Rebase left conflicts; waits for a human
    Conflict,
    /// Waiting on the review pipeline after a rebase
    ReReview,
    /// Merge requested from the host
    Merging,
    /// Merged into the base branch
    Merged,
    /// Gave up; needs a fresh approval
    Failed,
}

impl EntryStatus {
    /// Statuses that occupy the global single-flight slot
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Rebasing | Self::ReReview | Self::Merging)
    }

    /// Statuses that never change again
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Merged | Self::Failed)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Rebasing => write!(f, "rebasing"),
            Self::Conflict => write!(f, "conflict"),
            Self::ReReview => write!(f, "re_review"),
            Self::Merging => write!(f, "merging"),
            Self::Merged => write!(f, "merged"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One pull request under merge queue management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Entry id
    pub id: String,
    /// Task this entry belongs to (at most one entry per task)
    pub task_id: String,
    /// Owning project
    pub project_id: String,
    /// Pull request number
    pub pr_number: u64,
    /// Pull request head branch
    pub pr_branch: String,
    /// Branch the PR is rebased onto and merged into
    pub base_branch: String,
    /// Current status
    pub status: EntryStatus,
    /// Ordering key, lower runs first
    pub position: i64,
    /// Times the entry entered `rebasing`
    #[serde(default)]
    pub rebase_attempts: u32,
    /// Diagnostic for `conflict` and `failed`
    pub last_error: Option<String>,
    /// When the entry was approved
    pub approved_at: DateTime<Utc>,
    /// When the PR was observed merged
    pub merged_at: Option<DateTime<Utc>>,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Repository host types
// =============================================================================

/// PR state (open, closed, merged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrState {
    /// PR is open and can be merged
    Open,
    /// PR was closed without merging
    Closed,
    /// PR was merged
    Merged,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// PR details as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestDetails {
    /// PR number
    pub number: u64,
    /// PR title
    pub title: String,
    /// Current state of the PR
    pub state: PrState,
    /// Whether PR can be merged (no conflicts), `None` while the host computes it
    pub mergeable: Option<bool>,
    /// Head branch name
    pub head_ref: String,
    /// Base branch name
    pub base_ref: String,
    /// Web URL for the PR
    pub html_url: String,
}

impl PullRequestDetails {
    /// Whether the PR has been merged
    pub fn is_merged(&self) -> bool {
        self.state == PrState::Merged
    }
}

/// Result of a merge operation
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Whether the merge was successful
    pub merged: bool,
    /// The SHA of the merge commit (if successful)
    pub sha: Option<String>,
    /// Message from the merge operation (especially on failure)
    pub message: Option<String>,
}

/// Merge strategy/method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    /// Squash all commits into one
    Squash,
    /// Create a merge commit
    Merge,
    /// Rebase commits onto base branch
    Rebase,
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

/// Verdict of a submitted review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    /// Reviewer approved
    Approved,
    /// Reviewer asked for changes
    ChangesRequested,
    /// Comment-only review
    Commented,
    /// Review was dismissed
    Dismissed,
    /// Review not yet submitted
    Pending,
}

/// A pull request review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Review id (monotonically increasing on the host)
    pub id: u64,
    /// Review verdict
    pub state: ReviewState,
    /// Summary body
    pub body: String,
    /// Reviewer login
    pub author: Option<String>,
    /// Submission time
    pub submitted_at: Option<DateTime<Utc>>,
}

/// A diff-level review comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    /// Comment id
    pub id: u64,
    /// Review this comment was submitted with
    pub review_id: Option<u64>,
    /// File path the comment is anchored to
    pub path: String,
    /// Line in the new version of the file
    pub line: Option<u64>,
    /// Comment text
    pub body: String,
    /// Commenter login
    pub author: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_slug_parse() {
        let slug: RepoSlug = "acme/widgets".parse().unwrap();
        assert_eq!(slug.owner, "acme");
        assert_eq!(slug.name, "widgets");
        assert_eq!(slug.to_string(), "acme/widgets");

        let slug: RepoSlug = "acme/widgets.git".parse().unwrap();
        assert_eq!(slug.name, "widgets");
    }

    #[test]
    fn test_repo_slug_rejects_malformed() {
        assert!("widgets".parse::<RepoSlug>().is_err());
        assert!("/widgets".parse::<RepoSlug>().is_err());
        assert!("a/b/c".parse::<RepoSlug>().is_err());
    }

    #[test]
    fn test_base_branch_defaults_to_main() {
        let mut project = Project {
            id: "p1".to_string(),
            repo: RepoSlug::new("acme", "widgets"),
            repo_path: "/tmp/widgets".into(),
            branch: None,
            delegate_agent_id: None,
        };
        assert_eq!(project.base_branch(), "main");

        project.branch = Some(String::new());
        assert_eq!(project.base_branch(), "main");

        project.branch = Some("develop".to_string());
        assert_eq!(project.base_branch(), "develop");
    }

    #[test]
    fn test_entry_status_classes() {
        let active: Vec<_> = [
            EntryStatus::Queued,
            EntryStatus::Rebasing,
            EntryStatus::Conflict,
            EntryStatus::ReReview,
            EntryStatus::Merging,
            EntryStatus::Merged,
            EntryStatus::Failed,
        ]
        .into_iter()
        .filter(|s| s.is_active())
        .collect();
        assert_eq!(
            active,
            vec![EntryStatus::Rebasing, EntryStatus::ReReview, EntryStatus::Merging]
        );
        assert!(EntryStatus::Merged.is_terminal());
        assert!(EntryStatus::Failed.is_terminal());
        assert!(!EntryStatus::Conflict.is_terminal());
    }

    #[test]
    fn test_column_serde_names() {
        let json = serde_json::to_string(&TaskColumn::InReview).unwrap();
        assert_eq!(json, "\"in_review\"");
        let json = serde_json::to_string(&EntryStatus::ReReview).unwrap();
        assert_eq!(json, "\"re_review\"");
    }
}
