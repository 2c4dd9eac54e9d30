//! GitHub platform service implementation

use crate::error::{Error, Result};
use crate::platform::PlatformService;
use crate::types::{
    MergeMethod, MergeResult, PrState, PullRequestDetails, RepoSlug, Review, ReviewComment,
    ReviewState,
};
use async_trait::async_trait;
use octocrab::Octocrab;
use tracing::debug;

/// GitHub service using octocrab
pub struct GitHubService {
    client: Octocrab,
}

impl GitHubService {
    /// Create a new GitHub service
    ///
    /// `host` selects a GitHub Enterprise instance; `None` means github.com.
    pub fn new(token: &str, host: Option<&str>) -> Result<Self> {
        Self::build(Some(token), host)
    }

    /// Service without credentials, for commands that never reach the API
    pub fn anonymous(host: Option<&str>) -> Result<Self> {
        Self::build(None, host)
    }

    fn build(token: Option<&str>, host: Option<&str>) -> Result<Self> {
        let mut builder = Octocrab::builder();

        if let Some(token) = token {
            builder = builder.personal_token(token.to_string());
        }

        if let Some(h) = host {
            let base_url = format!("https://{h}/api/v3");
            builder = builder
                .base_uri(&base_url)
                .map_err(|e| Error::GitHubApi(e.to_string()))?;
        }

        let client = builder
            .build()
            .map_err(|e| Error::GitHubApi(e.to_string()))?;

        Ok(Self { client })
    }
}

fn review_state_from_octocrab(state: &octocrab::models::pulls::ReviewState) -> ReviewState {
    use octocrab::models::pulls::ReviewState as Gh;
    match state {
        Gh::Approved => ReviewState::Approved,
        Gh::ChangesRequested => ReviewState::ChangesRequested,
        Gh::Dismissed => ReviewState::Dismissed,
        Gh::Pending => ReviewState::Pending,
        // ReviewState is non-exhaustive
        _ => ReviewState::Commented,
    }
}

#[async_trait]
impl PlatformService for GitHubService {
    async fn get_pr_details(&self, repo: &RepoSlug, pr_number: u64) -> Result<PullRequestDetails> {
        debug!(%repo, pr_number, "getting PR details");

        let pr = self
            .client
            .pulls(&repo.owner, &repo.name)
            .get(pr_number)
            .await?;

        // Determine PR state from GitHub's state field and merged_at
        let state = match pr.state {
            Some(octocrab::models::IssueState::Open) => PrState::Open,
            Some(octocrab::models::IssueState::Closed) if pr.merged_at.is_some() => PrState::Merged,
            // IssueState is non-exhaustive, so use wildcard for Closed and any future variants
            Some(_) | None => PrState::Closed,
        };

        let details = PullRequestDetails {
            number: pr.number,
            title: pr.title.clone().unwrap_or_default(),
            state,
            mergeable: pr.mergeable,
            head_ref: pr.head.ref_field.clone(),
            base_ref: pr.base.ref_field.clone(),
            html_url: pr
                .html_url
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        };

        debug!(pr_number, state = %details.state, "got PR details");
        Ok(details)
    }

    async fn merge_pr(
        &self,
        repo: &RepoSlug,
        pr_number: u64,
        method: MergeMethod,
        title: &str,
    ) -> Result<MergeResult> {
        debug!(%repo, pr_number, %method, "merging PR");

        let octocrab_method = match method {
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
            MergeMethod::Rebase => octocrab::params::pulls::MergeMethod::Rebase,
        };

        let result = self
            .client
            .pulls(&repo.owner, &repo.name)
            .merge(pr_number)
            .method(octocrab_method)
            .title(title)
            .send()
            .await?;

        let merge_result = MergeResult {
            merged: result.merged,
            sha: result.sha,
            message: result.message,
        };

        debug!(
            pr_number,
            merged = merge_result.merged,
            sha = ?merge_result.sha,
            "merge complete"
        );
        Ok(merge_result)
    }

    async fn create_pr_comment(&self, repo: &RepoSlug, pr_number: u64, body: &str) -> Result<()> {
        debug!(%repo, pr_number, "creating PR comment");
        self.client
            .issues(&repo.owner, &repo.name)
            .create_comment(pr_number, body)
            .await?;
        debug!(pr_number, "created PR comment");
        Ok(())
    }

    async fn list_reviews(&self, repo: &RepoSlug, pr_number: u64) -> Result<Vec<Review>> {
        debug!(%repo, pr_number, "listing reviews");
        let page = self
            .client
            .pulls(&repo.owner, &repo.name)
            .list_reviews(pr_number)
            .per_page(100)
            .send()
            .await?;

        let reviews: Vec<Review> = page
            .items
            .into_iter()
            .filter_map(|r| {
                let state = r.state.as_ref().map(review_state_from_octocrab)?;
                Some(Review {
                    id: r.id.0,
                    state,
                    body: r.body.unwrap_or_default(),
                    author: r.user.map(|u| u.login),
                    submitted_at: r.submitted_at,
                })
            })
            .collect();
        debug!(pr_number, count = reviews.len(), "listed reviews");
        Ok(reviews)
    }

    async fn list_review_comments(
        &self,
        repo: &RepoSlug,
        pr_number: u64,
    ) -> Result<Vec<ReviewComment>> {
        debug!(%repo, pr_number, "listing review comments");
        let page = self
            .client
            .pulls(&repo.owner, &repo.name)
            .list_comments(Some(pr_number))
            .per_page(100)
            .send()
            .await?;

        let comments: Vec<ReviewComment> = page
            .items
            .into_iter()
            .map(|c| ReviewComment {
                id: c.id.0,
                review_id: c.pull_request_review_id.map(|id| id.0),
                path: c.path,
                line: c.line,
                body: c.body,
                author: c.user.map(|u| u.login),
            })
            .collect();
        debug!(pr_number, count = comments.len(), "listed review comments");
        Ok(comments)
    }
}
