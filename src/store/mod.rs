//! Task store and merge queue table
//!
//! The merge queue and the review monitor coordinate only through these
//! rows. Task writes are single-row patches so the two loops never clobber
//! each other's fields.

mod local;
mod state;
mod storage;

pub use local::LocalStore;
pub use state::{STATE_VERSION, StoreState};
pub use storage::{LockMode, StateLock, load_state, save_state};

use crate::error::Result;
use crate::types::{Project, QueueEntry, Task, TaskColumn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Kanban task access
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fetch a task
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>>;

    /// All tasks that currently reference a pull request
    async fn list_tasks_with_pr(&self) -> Result<Vec<Task>>;

    /// Apply a patch to one task and return the updated row
    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task>;

    /// Fetch a project
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>>;
}

/// Merge queue table access
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append an entry at `max(position) + 1`
    ///
    /// If the task already has an entry, that entry is returned unchanged and
    /// the second element is `false`.
    async fn append_entry(&self, entry: QueueEntry) -> Result<(QueueEntry, bool)>;

    /// Fetch an entry by id
    async fn get_entry(&self, entry_id: &str) -> Result<Option<QueueEntry>>;

    /// Fetch the entry for a task
    async fn entry_for_task(&self, task_id: &str) -> Result<Option<QueueEntry>>;

    /// All entries, ascending by position
    async fn list_entries(&self) -> Result<Vec<QueueEntry>>;

    /// Overwrite an existing entry
    async fn save_entry(&self, entry: &QueueEntry) -> Result<()>;

    /// Delete an entry, returning whether it existed
    async fn delete_entry(&self, entry_id: &str) -> Result<bool>;

    /// Delete the task's entry only if it is still `queued`
    ///
    /// Returns the removed entry. Check and delete happen atomically, so an
    /// entry the scheduler has already picked up is never removed.
    async fn withdraw_queued(&self, task_id: &str) -> Result<Option<QueueEntry>>;
}

/// Partial update of a task row
///
/// Unset fields are left alone. Counter bumps are applied to the stored
/// value, not to a caller's copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPatch {
    /// New column
    pub column: Option<TaskColumn>,
    /// New description
    pub description: Option<String>,
    /// Clear the PR number and branch
    pub clear_pr: bool,
    /// New assignee (`Some(None)` clears it)
    pub assignee_agent_id: Option<Option<String>>,
    /// New completion report
    pub completion_report: Option<String>,
    /// New review watermark
    pub review_watermark: Option<u64>,
    /// Add one to `pipeline_attempt`
    pub bump_pipeline_attempt: bool,
    /// Add one to `retry_count`
    pub bump_retry_count: bool,
    /// Modification time
    pub updated_at: DateTime<Utc>,
}

impl TaskPatch {
    /// Empty patch stamped with `now`
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            column: None,
            description: None,
            clear_pr: false,
            assignee_agent_id: None,
            completion_report: None,
            review_watermark: None,
            bump_pipeline_attempt: false,
            bump_retry_count: false,
            updated_at: now,
        }
    }

    /// Move the task to a column
    #[must_use]
    pub const fn column(mut self, column: TaskColumn) -> Self {
        self.column = Some(column);
        self
    }

    /// Replace the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Forget the pull request
    #[must_use]
    pub const fn clear_pr(mut self) -> Self {
        self.clear_pr = true;
        self
    }

    /// Unassign the task
    #[must_use]
    pub fn clear_assignee(mut self) -> Self {
        self.assignee_agent_id = Some(None);
        self
    }

    /// Set the completion report
    #[must_use]
    pub fn completion_report(mut self, report: impl Into<String>) -> Self {
        self.completion_report = Some(report.into());
        self
    }

    /// Record the most recently actioned review
    #[must_use]
    pub const fn review_watermark(mut self, review_id: u64) -> Self {
        self.review_watermark = Some(review_id);
        self
    }

    /// Count one more review cycle
    #[must_use]
    pub const fn bump_pipeline_attempt(mut self) -> Self {
        self.bump_pipeline_attempt = true;
        self
    }

    /// Count one more retry
    #[must_use]
    pub const fn bump_retry_count(mut self) -> Self {
        self.bump_retry_count = true;
        self
    }

    /// Apply the patch to a task row
    pub fn apply(self, task: &mut Task) {
        if let Some(column) = self.column {
            task.column = column;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if self.clear_pr {
            task.pr_number = None;
            task.pr_branch = None;
        }
        if let Some(assignee) = self.assignee_agent_id {
            task.assignee_agent_id = assignee;
        }
        if let Some(report) = self.completion_report {
            task.completion_report = Some(report);
        }
        if let Some(review_id) = self.review_watermark {
            task.review_watermark = Some(review_id);
        }
        if self.bump_pipeline_attempt {
            task.pipeline_attempt = task.pipeline_attempt.saturating_add(1);
        }
        if self.bump_retry_count {
            task.retry_count = task.retry_count.saturating_add(1);
        }
        task.updated_at = self.updated_at;
    }
}
