//! Repository host services
//!
//! Provides a typed interface over the pull request operations the merge
//! queue and the review monitor rely on.

mod github;

pub use github::GitHubService;

use crate::error::Result;
use crate::types::{
    MergeMethod, MergeResult, PullRequestDetails, RepoSlug, Review, ReviewComment,
};
use async_trait::async_trait;

/// Platform service trait for PR operations
///
/// Every call names the repository explicitly so one client can serve all
/// projects on the board.
#[async_trait]
pub trait PlatformService: Send + Sync {
    /// Get PR details including state and merge status
    async fn get_pr_details(&self, repo: &RepoSlug, pr_number: u64) -> Result<PullRequestDetails>;

    /// Merge a PR with the specified method and commit title
    ///
    /// Returns `Error::NotMergeable` when the host refuses the merge.
    async fn merge_pr(
        &self,
        repo: &RepoSlug,
        pr_number: u64,
        method: MergeMethod,
        title: &str,
    ) -> Result<MergeResult>;

    /// Create a conversation comment on a PR
    async fn create_pr_comment(&self, repo: &RepoSlug, pr_number: u64, body: &str) -> Result<()>;

    /// List submitted reviews on a PR, oldest first
    async fn list_reviews(&self, repo: &RepoSlug, pr_number: u64) -> Result<Vec<Review>>;

    /// List diff-level review comments on a PR
    async fn list_review_comments(
        &self,
        repo: &RepoSlug,
        pr_number: u64,
    ) -> Result<Vec<ReviewComment>>;
}
