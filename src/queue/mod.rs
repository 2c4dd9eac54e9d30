//! Merge queue scheduler
//!
//! Carries approved pull requests through rebase, optional re-review and
//! squash merge, one at a time across all projects:
//! 1. Reconcile - pick up merges and closes that happened on the host
//! 2. Plan - choose the next entry (pure, see [`plan`])
//! 3. Execute - rebase, push, re-review or merge (effectful)

mod execute;
mod plan;
mod reconcile;

pub use plan::{
    NextStep, conflict_comment, entries_to_requeue, merge_commit_title, plan_next,
};

use crate::clock::{LoopHandle, spawn_loop};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::git::GitCredentials;
use crate::pipeline::{ReReviewOutcome, ReReviewTicket};
use crate::services::Services;
use crate::types::{EntryStatus, Project, QueueEntry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Reason recorded when the post-rebase review rejects the change
pub const RE_REVIEW_FAILED: &str = "Re-review failed after rebase";

/// Global merge queue
///
/// At most one entry is in `rebasing`, `re_review` or `merging` at any
/// time, system-wide.
pub struct MergeQueue {
    services: Services,
    credentials: GitCredentials,
    in_flight: AtomicBool,
    outcomes_tx: mpsc::UnboundedSender<ReReviewOutcome>,
    outcomes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ReReviewOutcome>>,
    timer: Mutex<Option<LoopHandle>>,
}

/// Clears the in-flight flag when a tick ends, even on early return
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MergeQueue {
    /// Create a merge queue; `credentials` are used for every git push
    pub fn new(services: Services, credentials: GitCredentials) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            services,
            credentials,
            in_flight: AtomicBool::new(false),
            outcomes_tx,
            outcomes_rx: tokio::sync::Mutex::new(outcomes_rx),
            timer: Mutex::new(None),
        }
    }

    // =========================================================================
    // Queue management
    // =========================================================================

    /// Put a task's pull request in the queue
    ///
    /// Returns `None` when the task has no PR number or branch. Approving a
    /// task that is already queued returns its existing entry unchanged.
    pub async fn approve_for_merge(&self, task_id: &str) -> Result<Option<QueueEntry>> {
        let task = self.services.require_task(task_id).await?;

        let (Some(pr_number), Some(pr_branch)) = (task.pr_number, task.pr_branch.clone()) else {
            debug!(task_id, "task has no pull request, not queueing");
            return Ok(None);
        };

        if let Some(existing) = self.services.queue.entry_for_task(task_id).await? {
            return Ok(Some(existing));
        }

        let base_branch = match self.services.tasks.get_project(&task.project_id).await? {
            Some(project) => project.base_branch().to_string(),
            None => Project::DEFAULT_BRANCH.to_string(),
        };

        let now = self.services.now();
        let candidate = QueueEntry {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            project_id: task.project_id.clone(),
            pr_number,
            pr_branch,
            base_branch,
            status: EntryStatus::Queued,
            position: 0,
            rebase_attempts: 0,
            last_error: None,
            approved_at: now,
            merged_at: None,
            created_at: now,
            updated_at: now,
        };

        let (entry, inserted) = self.services.queue.append_entry(candidate).await?;
        if inserted {
            info!(
                task_id,
                entry_id = %entry.id,
                pr_number,
                position = entry.position,
                "approved for merge"
            );
            self.services.events.emit(Event::EntryUpdated {
                entry: entry.clone(),
            });
            self.notify_queue(&entry.project_id);
        }
        Ok(Some(entry))
    }

    /// Drop a task's entry from the queue; the task itself is not touched
    pub async fn remove_from_queue(&self, task_id: &str) -> Result<bool> {
        let Some(entry) = self.services.queue.entry_for_task(task_id).await? else {
            return Ok(false);
        };
        let removed = self.services.queue.delete_entry(&entry.id).await?;
        if removed {
            info!(task_id, entry_id = %entry.id, "removed from merge queue");
            self.notify_removed(&entry);
        }
        Ok(removed)
    }

    /// Entries ascending by position, optionally for one project
    pub async fn get_queue(&self, project_id: Option<&str>) -> Result<Vec<QueueEntry>> {
        let mut entries = self.services.queue.list_entries().await?;
        if let Some(project_id) = project_id {
            entries.retain(|e| e.project_id == project_id);
        }
        entries.sort_by_key(|e| e.position);
        Ok(entries)
    }

    /// Whether the task has a queue entry
    pub async fn is_in_queue(&self, task_id: &str) -> Result<bool> {
        Ok(self.services.queue.entry_for_task(task_id).await?.is_some())
    }

    /// Overwrite an entry's position
    ///
    /// Collisions are not resolved; callers supply a consistent ordering.
    pub async fn reorder_entry(&self, entry_id: &str, position: i64) -> Result<QueueEntry> {
        let mut entry = self
            .services
            .queue
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        entry.position = position;
        self.save_entry(&mut entry).await?;
        self.notify_queue(&entry.project_id);
        Ok(entry)
    }

    // =========================================================================
    // Scheduling loop
    // =========================================================================

    /// Recover from a restart, then poll every `interval` until [`stop`]
    ///
    /// Calling `start` on a running queue does nothing.
    ///
    /// [`stop`]: Self::stop
    pub async fn start(self: &Arc<Self>, interval: Duration) {
        if self.lock_timer().is_some() {
            warn!("merge queue already running");
            return;
        }

        match self.recover().await {
            Ok(requeued) => info!(requeued, "merge queue recovered"),
            Err(e) => error!(error = %e, "merge queue recovery failed"),
        }

        let queue = Arc::clone(self);
        let handle = spawn_loop(interval, move || {
            let queue = Arc::clone(&queue);
            async move { queue.poll().await }
        });

        // Another start may have raced us while recovering
        let duplicate = {
            let mut timer = self.lock_timer();
            if timer.is_none() {
                *timer = Some(handle);
                None
            } else {
                Some(handle)
            }
        };
        if let Some(handle) = duplicate {
            handle.stop().await;
        }
    }

    /// Stop the timer loop; returns whether it was running
    pub async fn stop(&self) -> bool {
        let handle = self.lock_timer().take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                info!("merge queue stopped");
                true
            }
            None => false,
        }
    }

    /// One scheduler tick
    ///
    /// Applies finished re-reviews, reconciles with the host, then advances
    /// the queue. Skipped entirely while a previous tick is still running.
    pub async fn poll(&self) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("previous merge queue tick still running");
            return;
        }
        let _guard = FlightGuard(&self.in_flight);

        self.apply_re_review_outcomes().await;

        if let Err(e) = self.sync_external_state().await {
            error!(error = %e, "merge queue reconciliation failed");
        }

        if let Err(e) = self.process_next().await {
            error!(error = %e, "merge queue processing failed");
        }
    }

    /// Process the next queued entry unless one already holds the slot
    ///
    /// Returns the entry that was processed, if any.
    pub async fn process_next(&self) -> Result<Option<QueueEntry>> {
        let entries = self.services.queue.list_entries().await?;
        match plan_next(&entries) {
            NextStep::Busy { entry_id, status } => {
                debug!(%entry_id, %status, "merge queue busy");
                Ok(None)
            }
            NextStep::Idle => Ok(None),
            NextStep::Process { entry_id } => self.process_entry(&entry_id).await.map(Some),
        }
    }

    async fn apply_re_review_outcomes(&self) {
        let mut rx = self.outcomes_rx.lock().await;
        while let Ok(outcome) = rx.try_recv() {
            if let Err(e) = self
                .on_re_review_complete(&outcome.task_id, outcome.passed)
                .await
            {
                error!(task_id = %outcome.task_id, error = %e, "failed to apply re-review result");
            }
        }
    }

    fn ticket(&self, task_id: &str) -> ReReviewTicket {
        ReReviewTicket::new(task_id.to_string(), self.outcomes_tx.clone())
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<LoopHandle>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Row helpers
    // =========================================================================

    async fn save_entry(&self, entry: &mut QueueEntry) -> Result<()> {
        entry.updated_at = self.services.now();
        self.services.queue.save_entry(entry).await?;
        self.services.events.emit(Event::EntryUpdated {
            entry: entry.clone(),
        });
        Ok(())
    }

    async fn set_status(&self, entry: &mut QueueEntry, status: EntryStatus) -> Result<()> {
        debug!(entry_id = %entry.id, from = %entry.status, to = %status, "entry transition");
        entry.status = status;
        self.save_entry(entry).await
    }

    fn notify_queue(&self, project_id: &str) {
        self.services.events.emit(Event::QueueUpdated {
            project_id: project_id.to_string(),
        });
    }

    fn notify_removed(&self, entry: &QueueEntry) {
        self.services.events.emit(Event::EntryRemoved {
            entry_id: entry.id.clone(),
            task_id: entry.task_id.clone(),
        });
        self.notify_queue(&entry.project_id);
    }
}
