//! Optional review pipeline and fix directives
//!
//! The review pipeline is an external, per-project plug-in. When it is not
//! present the merge queue merges straight after a rebase and the monitor
//! sends review feedback to the project's delegate as a [`Directive`].

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Re-review request sent after a successful rebase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReReviewRequest {
    /// Task being merged
    pub task_id: String,
    /// Rebased PR branch
    pub branch: String,
    /// PR number
    pub pr_number: u64,
}

/// Verdict of an asynchronous re-review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReReviewOutcome {
    /// Task that was re-reviewed
    pub task_id: String,
    /// Whether the review passed
    pub passed: bool,
}

/// Continuation handed to the pipeline with a re-review request
///
/// The pipeline resolves it once the review finishes; the merge queue picks
/// the verdict up on its loop and resumes the entry.
#[derive(Debug, Clone)]
pub struct ReReviewTicket {
    task_id: String,
    tx: mpsc::UnboundedSender<ReReviewOutcome>,
}

impl ReReviewTicket {
    pub(crate) const fn new(task_id: String, tx: mpsc::UnboundedSender<ReReviewOutcome>) -> Self {
        Self { task_id, tx }
    }

    /// Task this ticket belongs to
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Report the verdict back to the merge queue
    ///
    /// Returns `false` if the merge queue is gone.
    pub fn complete(self, passed: bool) -> bool {
        self.tx
            .send(ReReviewOutcome {
                task_id: self.task_id,
                passed,
            })
            .is_ok()
    }
}

/// External review pipeline
#[async_trait]
pub trait PipelineManager: Send + Sync {
    /// Whether the pipeline handles reviews for this project
    async fn is_enabled(&self, project_id: &str) -> bool;

    /// Start an asynchronous re-review; the verdict arrives through `ticket`
    async fn start_re_review(
        &self,
        request: ReReviewRequest,
        ticket: ReReviewTicket,
    ) -> Result<()>;

    /// Hand reviewer feedback to the pipeline so it can drive the fix
    async fn handle_review_feedback(
        &self,
        task_id: &str,
        feedback: &str,
        branch: &str,
        pr_number: u64,
    ) -> Result<()>;
}

/// Pipeline used when no review pipeline is installed
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPipeline;

#[async_trait]
impl PipelineManager for DisabledPipeline {
    async fn is_enabled(&self, _project_id: &str) -> bool {
        false
    }

    async fn start_re_review(
        &self,
        _request: ReReviewRequest,
        _ticket: ReReviewTicket,
    ) -> Result<()> {
        Ok(())
    }

    async fn handle_review_feedback(
        &self,
        _task_id: &str,
        _feedback: &str,
        _branch: &str,
        _pr_number: u64,
    ) -> Result<()> {
        Ok(())
    }
}

/// Instruction for the implementing agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    /// Project the task belongs to
    pub project_id: String,
    /// Agent the directive is addressed to
    pub to_agent_id: String,
    /// Task to work on
    pub task_id: String,
    /// Instruction text
    pub body: String,
}

/// Delivers directives to agents
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver a directive
    async fn dispatch(&self, directive: Directive) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticket_delivers_verdict() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticket = ReReviewTicket::new("t1".to_string(), tx);
        assert_eq!(ticket.task_id(), "t1");
        assert!(ticket.complete(true));

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.task_id, "t1");
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn test_ticket_reports_closed_queue() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let ticket = ReReviewTicket::new("t1".to_string(), tx);
        assert!(!ticket.complete(false));
    }

    #[tokio::test]
    async fn test_disabled_pipeline() {
        assert!(!DisabledPipeline.is_enabled("p1").await);
    }
}
