//! Mock platform service for testing

#![allow(dead_code)]

use async_trait::async_trait;
use pr_shepherd::error::{Error, Result};
use pr_shepherd::platform::PlatformService;
use pr_shepherd::types::{
    MergeMethod, MergeResult, PrState, PullRequestDetails, RepoSlug, Review, ReviewComment,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Call record for `create_pr_comment`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCommentCall {
    pub pr_number: u64,
    pub body: String,
}

/// Call record for `merge_pr`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePrCall {
    pub pr_number: u64,
    pub method: MergeMethod,
    pub title: String,
}

/// Hand-written [`PlatformService`] with per-PR responses
///
/// Features:
/// - Configurable responses per PR number
/// - Call tracking for verification
/// - Error injection for failure path testing
///
/// PRs without a configured details response are reported open.
#[derive(Default)]
pub struct MockPlatformService {
    pr_details_responses: Mutex<HashMap<u64, PullRequestDetails>>,
    merge_responses: Mutex<HashMap<u64, MergeResult>>,
    review_responses: Mutex<HashMap<u64, Vec<Review>>>,
    review_comment_responses: Mutex<HashMap<u64, Vec<ReviewComment>>>,
    // Call tracking
    get_pr_details_calls: Mutex<Vec<u64>>,
    merge_pr_calls: Mutex<Vec<MergePrCall>>,
    create_comment_calls: Mutex<Vec<CreateCommentCall>>,
    list_reviews_calls: Mutex<Vec<u64>>,
    list_review_comments_calls: Mutex<Vec<u64>>,
    // Error injection
    error_on_merge_pr: Mutex<Option<Error>>,
    error_on_get_pr_details: Mutex<HashMap<u64, String>>,
}

impl MockPlatformService {
    pub fn new() -> Self {
        Self::default()
    }

    // === Error injection methods ===

    /// Make `merge_pr` return this error (once)
    pub fn fail_merge_pr(&self, error: Error) {
        *self.error_on_merge_pr.lock().unwrap() = Some(error);
    }

    /// Make `get_pr_details` fail for one PR
    pub fn fail_get_pr_details(&self, pr_number: u64, msg: &str) {
        self.error_on_get_pr_details
            .lock()
            .unwrap()
            .insert(pr_number, msg.to_string());
    }

    // === Response setup ===

    pub fn set_pr_state(&self, pr_number: u64, state: PrState) {
        self.pr_details_responses
            .lock()
            .unwrap()
            .insert(pr_number, make_details(pr_number, state));
    }

    pub fn set_merge_response(&self, pr_number: u64, result: MergeResult) {
        self.merge_responses
            .lock()
            .unwrap()
            .insert(pr_number, result);
    }

    pub fn set_reviews(&self, pr_number: u64, reviews: Vec<Review>) {
        self.review_responses
            .lock()
            .unwrap()
            .insert(pr_number, reviews);
    }

    pub fn set_review_comments(&self, pr_number: u64, comments: Vec<ReviewComment>) {
        self.review_comment_responses
            .lock()
            .unwrap()
            .insert(pr_number, comments);
    }

    // === Call inspection ===

    pub fn get_pr_details_calls(&self) -> Vec<u64> {
        self.get_pr_details_calls.lock().unwrap().clone()
    }

    pub fn merge_pr_calls(&self) -> Vec<MergePrCall> {
        self.merge_pr_calls.lock().unwrap().clone()
    }

    pub fn create_comment_calls(&self) -> Vec<CreateCommentCall> {
        self.create_comment_calls.lock().unwrap().clone()
    }

    pub fn list_reviews_calls(&self) -> Vec<u64> {
        self.list_reviews_calls.lock().unwrap().clone()
    }

    pub fn list_review_comments_calls(&self) -> Vec<u64> {
        self.list_review_comments_calls.lock().unwrap().clone()
    }

    /// Assert `merge_pr` was called for exactly these PRs, in order
    pub fn assert_merged(&self, expected: &[u64]) {
        let calls: Vec<u64> = self.merge_pr_calls().iter().map(|c| c.pr_number).collect();
        assert_eq!(calls, expected, "merge_pr calls mismatch");
    }
}

pub fn make_details(pr_number: u64, state: PrState) -> PullRequestDetails {
    PullRequestDetails {
        number: pr_number,
        title: format!("PR {pr_number}"),
        state,
        mergeable: Some(state == PrState::Open),
        head_ref: format!("feat/pr-{pr_number}"),
        base_ref: "main".to_string(),
        html_url: format!("https://github.com/acme/widgets/pull/{pr_number}"),
    }
}

#[async_trait]
impl PlatformService for MockPlatformService {
    async fn get_pr_details(&self, _repo: &RepoSlug, pr_number: u64) -> Result<PullRequestDetails> {
        self.get_pr_details_calls.lock().unwrap().push(pr_number);
        if let Some(msg) = self.error_on_get_pr_details.lock().unwrap().get(&pr_number) {
            return Err(Error::GitHubApi(msg.clone()));
        }
        Ok(self
            .pr_details_responses
            .lock()
            .unwrap()
            .get(&pr_number)
            .cloned()
            .unwrap_or_else(|| make_details(pr_number, PrState::Open)))
    }

    async fn merge_pr(
        &self,
        _repo: &RepoSlug,
        pr_number: u64,
        method: MergeMethod,
        title: &str,
    ) -> Result<MergeResult> {
        self.merge_pr_calls.lock().unwrap().push(MergePrCall {
            pr_number,
            method,
            title: title.to_string(),
        });
        if let Some(err) = self.error_on_merge_pr.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self
            .merge_responses
            .lock()
            .unwrap()
            .get(&pr_number)
            .cloned()
            .unwrap_or(MergeResult {
                merged: true,
                sha: Some(format!("sha{pr_number}")),
                message: None,
            }))
    }

    async fn create_pr_comment(&self, _repo: &RepoSlug, pr_number: u64, body: &str) -> Result<()> {
        self.create_comment_calls
            .lock()
            .unwrap()
            .push(CreateCommentCall {
                pr_number,
                body: body.to_string(),
            });
        Ok(())
    }

    async fn list_reviews(&self, _repo: &RepoSlug, pr_number: u64) -> Result<Vec<Review>> {
        self.list_reviews_calls.lock().unwrap().push(pr_number);
        Ok(self
            .review_responses
            .lock()
            .unwrap()
            .get(&pr_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_review_comments(
        &self,
        _repo: &RepoSlug,
        pr_number: u64,
    ) -> Result<Vec<ReviewComment>> {
        self.list_review_comments_calls
            .lock()
            .unwrap()
            .push(pr_number);
        Ok(self
            .review_comment_responses
            .lock()
            .unwrap()
            .get(&pr_number)
            .cloned()
            .unwrap_or_default())
    }
}
