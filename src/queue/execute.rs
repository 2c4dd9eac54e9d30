//! Queue execution - rebase, push, re-review and merge (effectful)

use super::{MergeQueue, RE_REVIEW_FAILED, conflict_comment, merge_commit_title};
use crate::error::{Error, Result};
use crate::git::RebaseOutcome;
use crate::pipeline::ReReviewRequest;
use crate::types::{EntryStatus, MergeMethod, Project, QueueEntry, Task, TaskColumn};
use tracing::{error, info, warn};

impl MergeQueue {
    /// Run one entry from `queued` as far as it can go in this call
    ///
    /// Ends in `conflict`, `failed`, `re_review` (waiting on the pipeline),
    /// `merged`, or `merging` when the host gave an ambiguous error.
    pub async fn process_entry(&self, entry_id: &str) -> Result<QueueEntry> {
        let mut entry = self
            .services
            .queue
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;

        let (task, project) = match self.load_context(&entry).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(entry_id, error = %e, "cannot process entry");
                self.fail(&mut entry, e.to_string()).await?;
                return Ok(entry);
            }
        };

        entry.rebase_attempts += 1;
        self.set_status(&mut entry, EntryStatus::Rebasing).await?;
        info!(
            entry_id,
            pr_number = entry.pr_number,
            branch = %entry.pr_branch,
            base = %entry.base_branch,
            attempt = entry.rebase_attempts,
            "rebasing"
        );

        let rebase = self
            .services
            .git
            .rebase_branch(
                &project.repo_path,
                &entry.pr_branch,
                &entry.base_branch,
                &self.credentials,
            )
            .await;

        let detail = match rebase {
            Ok(RebaseOutcome::Rebased) => None,
            Ok(RebaseOutcome::Conflict(detail)) => Some(detail),
            Err(e) => Some(e.to_string()),
        };
        if let Some(detail) = detail {
            self.mark_conflict(&mut entry, &project, detail).await?;
            return Ok(entry);
        }

        if let Err(e) = self
            .services
            .git
            .force_push_branch(&project.repo_path, &entry.pr_branch, &self.credentials)
            .await
        {
            error!(entry_id, error = %e, "force push failed");
            self.fail(&mut entry, format!("Force push failed: {e}")).await?;
            return Ok(entry);
        }

        if self.services.pipeline.is_enabled(&entry.project_id).await {
            self.set_status(&mut entry, EntryStatus::ReReview).await?;
            let request = ReReviewRequest {
                task_id: entry.task_id.clone(),
                branch: entry.pr_branch.clone(),
                pr_number: entry.pr_number,
            };
            match self
                .services
                .pipeline
                .start_re_review(request, self.ticket(&entry.task_id))
                .await
            {
                Ok(()) => {
                    info!(entry_id, "waiting for re-review");
                    return Ok(entry);
                }
                Err(e) => {
                    warn!(entry_id, error = %e, "re-review could not start, merging directly");
                }
            }
        }

        self.set_status(&mut entry, EntryStatus::Merging).await?;
        self.merge_entry(&mut entry, &task, &project).await?;
        Ok(entry)
    }

    /// Squash-merge an entry through the host
    pub async fn do_merge(&self, entry_id: &str) -> Result<QueueEntry> {
        let mut entry = self
            .services
            .queue
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        let (task, project) = self.load_context(&entry).await?;
        self.merge_entry(&mut entry, &task, &project).await?;
        Ok(entry)
    }

    /// Resume an entry once the review pipeline has judged the rebased branch
    ///
    /// Does nothing when the task has no entry or the entry is no longer
    /// waiting on a re-review.
    pub async fn on_re_review_complete(&self, task_id: &str, passed: bool) -> Result<()> {
        let Some(mut entry) = self.services.queue.entry_for_task(task_id).await? else {
            return Ok(());
        };
        if entry.status != EntryStatus::ReReview {
            warn!(
                task_id,
                status = %entry.status,
                "ignoring re-review result for entry not awaiting one"
            );
            return Ok(());
        }

        if passed {
            info!(task_id, entry_id = %entry.id, "re-review passed");
            let (task, project) = match self.load_context(&entry).await {
                Ok(ctx) => ctx,
                Err(e) => {
                    error!(task_id, entry_id = %entry.id, error = %e, "cannot merge entry");
                    return self.fail(&mut entry, e.to_string()).await;
                }
            };
            self.set_status(&mut entry, EntryStatus::Merging).await?;
            self.merge_entry(&mut entry, &task, &project).await?;
        } else {
            info!(task_id, entry_id = %entry.id, "re-review failed");
            self.fail(&mut entry, RE_REVIEW_FAILED.to_string()).await?;
            let patch = self.services.patch().column(TaskColumn::InReview);
            self.services.update_task(task_id, patch).await?;
        }
        Ok(())
    }

    async fn merge_entry(
        &self,
        entry: &mut QueueEntry,
        task: &Task,
        project: &Project,
    ) -> Result<()> {
        let title = merge_commit_title(&task.title, entry.pr_number);
        let result = self
            .services
            .platform
            .merge_pr(&project.repo, entry.pr_number, MergeMethod::Squash, &title)
            .await
            .and_then(|r| {
                if r.merged {
                    Ok(r)
                } else {
                    Err(Error::NotMergeable(
                        r.message.unwrap_or_else(|| "merge was not performed".to_string()),
                    ))
                }
            });

        match result {
            Ok(merge) => {
                info!(
                    entry_id = %entry.id,
                    pr_number = entry.pr_number,
                    sha = ?merge.sha,
                    "merged"
                );
                let report = format!("Merged via merge queue: PR #{}", entry.pr_number);
                self.mark_merged(entry, report).await
            }
            Err(e) if e.is_not_mergeable() => {
                warn!(entry_id = %entry.id, error = %e, "host refused merge");
                self.fail(entry, e.to_string()).await
            }
            Err(e) => {
                // Left in `merging`: retrying could merge twice, reconciliation
                // will see the merge if it went through.
                error!(
                    entry_id = %entry.id,
                    pr_number = entry.pr_number,
                    error = %e,
                    "merge outcome unknown, holding queue"
                );
                Ok(())
            }
        }
    }

    /// Record a merge and finish the task
    pub(super) async fn mark_merged(&self, entry: &mut QueueEntry, report: String) -> Result<()> {
        entry.merged_at = Some(self.services.now());
        entry.last_error = None;
        self.set_status(entry, EntryStatus::Merged).await?;

        let patch = self
            .services
            .patch()
            .column(TaskColumn::Done)
            .completion_report(report);
        if let Err(e) = self.services.update_task(&entry.task_id, patch).await {
            warn!(task_id = %entry.task_id, error = %e, "failed to finish merged task");
        }
        Ok(())
    }

    async fn mark_conflict(
        &self,
        entry: &mut QueueEntry,
        project: &Project,
        detail: String,
    ) -> Result<()> {
        warn!(entry_id = %entry.id, pr_number = entry.pr_number, "rebase conflict");
        let comment = conflict_comment(entry, &detail);
        entry.last_error = Some(detail);
        self.set_status(entry, EntryStatus::Conflict).await?;

        if let Err(e) = self
            .services
            .platform
            .create_pr_comment(&project.repo, entry.pr_number, &comment)
            .await
        {
            warn!(pr_number = entry.pr_number, error = %e, "failed to comment on PR");
        }

        let patch = self.services.patch().column(TaskColumn::Backlog);
        if let Err(e) = self.services.update_task(&entry.task_id, patch).await {
            warn!(task_id = %entry.task_id, error = %e, "failed to move task to backlog");
        }
        Ok(())
    }

    async fn fail(&self, entry: &mut QueueEntry, reason: String) -> Result<()> {
        entry.last_error = Some(reason);
        self.set_status(entry, EntryStatus::Failed).await
    }

    async fn load_context(&self, entry: &QueueEntry) -> Result<(Task, Project)> {
        let task = self.services.require_task(&entry.task_id).await?;
        let project = self.services.require_project(&entry.project_id).await?;
        Ok((task, project))
    }
}
