//! PR review-cycle monitor
//!
//! Watches tasks with open pull requests and routes reviewer feedback back
//! to whoever implements the task, within a fixed review-cycle budget.

mod feedback;

pub use feedback::{
    FEEDBACK_END, FEEDBACK_START, budget_exceeded, budget_exceeded_report, embed_feedback,
    fix_directive, latest_actionable, render_feedback,
};

use crate::clock::{LoopHandle, spawn_loop};
use crate::error::Result;
use crate::events::Event;
use crate::pipeline::Directive;
use crate::services::Services;
use crate::types::{PrState, Project, PullRequestDetails, Review, Task, TaskColumn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default number of review round trips a PR may use
pub const MAX_REVIEW_CYCLES: u32 = 3;

/// What a check did to a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    /// Nothing to do
    None,
    /// Left alone while the merge queue owns it
    Skipped,
    /// PR was merged; task finished
    Merged,
    /// PR was closed unmerged; task back to backlog
    Closed,
    /// Feedback from this review was routed to the implementer
    FeedbackSent {
        /// Actioned review
        review_id: u64,
    },
    /// Budget used up; task failed without routing feedback
    BudgetExceeded {
        /// Review that tripped the budget
        review_id: u64,
    },
}

/// Review-cycle monitor
pub struct ReviewMonitor {
    services: Services,
    max_review_cycles: u32,
    in_flight: AtomicBool,
    timer: Mutex<Option<LoopHandle>>,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReviewMonitor {
    /// Create a monitor with the default budget
    pub fn new(services: Services) -> Self {
        Self {
            services,
            max_review_cycles: MAX_REVIEW_CYCLES,
            in_flight: AtomicBool::new(false),
            timer: Mutex::new(None),
        }
    }

    /// Override the review-cycle budget
    #[must_use]
    pub const fn with_max_review_cycles(mut self, max_review_cycles: u32) -> Self {
        self.max_review_cycles = max_review_cycles;
        self
    }

    /// Configured review-cycle budget
    pub const fn max_review_cycles(&self) -> u32 {
        self.max_review_cycles
    }

    /// Poll every `interval` until [`stop`](Self::stop); no-op if running
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let mut timer = self.lock_timer();
        if timer.is_some() {
            warn!("review monitor already running");
            return;
        }
        let monitor = Arc::clone(self);
        *timer = Some(spawn_loop(interval, move || {
            let monitor = Arc::clone(&monitor);
            async move { monitor.poll().await }
        }));
        info!(?interval, "review monitor started");
    }

    /// Stop the timer loop; returns whether it was running
    pub async fn stop(&self) -> bool {
        let handle = self.lock_timer().take();
        let Some(handle) = handle else {
            return false;
        };
        handle.stop().await;
        info!("review monitor stopped");
        true
    }

    /// One monitor tick over every open task with a pull request
    ///
    /// `backlog`, `in_progress` and `in_review` tasks are checked. `done` and
    /// `triage` tasks are left alone: a done task's PR is settled, and triage
    /// work has not started. Skipped while a previous tick is still running.
    /// A task that fails is logged and the rest are still checked.
    pub async fn poll(&self) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("previous review monitor tick still running");
            return;
        }
        let _guard = FlightGuard(&self.in_flight);

        let tasks = match self.services.tasks.list_tasks_with_pr().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "failed to list tasks with pull requests");
                return;
            }
        };

        for task in tasks
            .into_iter()
            .filter(|t| {
                matches!(
                    t.column,
                    TaskColumn::Backlog | TaskColumn::InProgress | TaskColumn::InReview
                )
            })
        {
            let task_id = task.id.clone();
            match self.check_task(task).await {
                Ok(ReviewAction::None | ReviewAction::Skipped) => {}
                Ok(action) => debug!(%task_id, ?action, "review monitor acted"),
                Err(e) => warn!(%task_id, error = %e, "review check failed"),
            }
        }
    }

    /// Check one task's pull request and act on it
    pub async fn check_task(&self, task: Task) -> Result<ReviewAction> {
        let Some(pr_number) = task.pr_number else {
            return Ok(ReviewAction::None);
        };
        let project = self.services.require_project(&task.project_id).await?;
        let details = self
            .services
            .platform
            .get_pr_details(&project.repo, pr_number)
            .await?;

        match details.state {
            PrState::Merged => {
                info!(task_id = %task.id, pr_number, "PR merged");
                let patch = self
                    .services
                    .patch()
                    .column(TaskColumn::Done)
                    .completion_report(format!("PR #{pr_number} merged"));
                self.services.update_task(&task.id, patch).await?;
                Ok(ReviewAction::Merged)
            }
            PrState::Closed => {
                info!(task_id = %task.id, pr_number, "PR closed without merge");
                let patch = self
                    .services
                    .patch()
                    .column(TaskColumn::Backlog)
                    .clear_assignee()
                    .bump_retry_count()
                    .clear_pr();
                self.services.update_task(&task.id, patch).await?;
                Ok(ReviewAction::Closed)
            }
            PrState::Open => self.check_reviews(task, &project, pr_number, &details).await,
        }
    }

    async fn check_reviews(
        &self,
        task: Task,
        project: &Project,
        pr_number: u64,
        details: &PullRequestDetails,
    ) -> Result<ReviewAction> {
        if let Some(entry) = self.services.queue.entry_for_task(&task.id).await?
            && entry.status.is_active()
        {
            debug!(task_id = %task.id, status = %entry.status, "merge queue owns task");
            return Ok(ReviewAction::Skipped);
        }

        let reviews = self
            .services
            .platform
            .list_reviews(&project.repo, pr_number)
            .await?;
        let Some(review) = latest_actionable(&reviews, task.review_watermark).cloned() else {
            return Ok(ReviewAction::None);
        };

        if !self.withdraw_from_queue(&task).await? {
            return Ok(ReviewAction::Skipped);
        }

        if budget_exceeded(task.pipeline_attempt, self.max_review_cycles) {
            return self.fail_budget(&task, pr_number, &review).await;
        }

        let comments = self
            .services
            .platform
            .list_review_comments(&project.repo, pr_number)
            .await?;
        let feedback = render_feedback(&review, &comments);
        let branch = task
            .pr_branch
            .clone()
            .unwrap_or_else(|| details.head_ref.clone());

        // Recorded before dispatch so a failed delivery is not retried on the
        // next poll; the feedback stays in the task description.
        let patch = self
            .services
            .patch()
            .column(TaskColumn::InProgress)
            .description(embed_feedback(&task.description, &feedback))
            .bump_pipeline_attempt()
            .review_watermark(review.id);
        let task = self.services.update_task(&task.id, patch).await?;
        info!(
            task_id = %task.id,
            pr_number,
            review_id = review.id,
            cycle = task.pipeline_attempt,
            "changes requested"
        );

        if self.services.pipeline.is_enabled(&task.project_id).await {
            self.services
                .pipeline
                .handle_review_feedback(&task.id, &feedback, &branch, pr_number)
                .await?;
        } else {
            let recipient = project
                .delegate_agent_id
                .clone()
                .or_else(|| task.assignee_agent_id.clone());
            match recipient {
                Some(to_agent_id) => {
                    let directive = Directive {
                        project_id: task.project_id.clone(),
                        to_agent_id,
                        task_id: task.id.clone(),
                        body: fix_directive(&task.title, pr_number, &branch, &feedback),
                    };
                    self.services.dispatcher.dispatch(directive).await?;
                }
                None => warn!(task_id = %task.id, "no agent to send review feedback to"),
            }
        }

        Ok(ReviewAction::FeedbackSent {
            review_id: review.id,
        })
    }

    async fn fail_budget(
        &self,
        task: &Task,
        pr_number: u64,
        review: &Review,
    ) -> Result<ReviewAction> {
        warn!(
            task_id = %task.id,
            pr_number,
            cycles = task.pipeline_attempt,
            max = self.max_review_cycles,
            "review cycle budget exceeded"
        );
        let report =
            budget_exceeded_report(pr_number, task.pipeline_attempt, self.max_review_cycles);
        let patch = self
            .services
            .patch()
            .column(TaskColumn::Done)
            .completion_report(report)
            .bump_pipeline_attempt()
            .review_watermark(review.id);
        self.services.update_task(&task.id, patch).await?;
        Ok(ReviewAction::BudgetExceeded {
            review_id: review.id,
        })
    }

    /// Take a still-waiting queue entry out before the task goes back for fixes
    ///
    /// Returns `false` when the merge queue picked the entry up in the
    /// meantime; the review is then left for a later poll.
    async fn withdraw_from_queue(&self, task: &Task) -> Result<bool> {
        if let Some(entry) = self.services.queue.withdraw_queued(&task.id).await? {
            info!(
                task_id = %task.id,
                entry_id = %entry.id,
                "withdrawn from merge queue, changes requested"
            );
            self.services.events.emit(Event::EntryRemoved {
                entry_id: entry.id.clone(),
                task_id: entry.task_id.clone(),
            });
            self.services.events.emit(Event::QueueUpdated {
                project_id: entry.project_id,
            });
            return Ok(true);
        }

        match self.services.queue.entry_for_task(&task.id).await? {
            Some(entry) if entry.status.is_active() => {
                debug!(task_id = %task.id, status = %entry.status, "merge queue took task");
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<LoopHandle>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
